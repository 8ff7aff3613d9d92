//! String enums become `StrEnum` classes

use crate::{
    args,
    error::Result,
    gen::CodegenContext,
    generators::separate,
    model::{EnumValue, Shape},
    runtime,
    strings::to_screaming_snake_case,
    writer::{Section, WriterDelegator},
};

/// python constant name for an enum member
pub(crate) fn constant_name(name: &str) -> String {
    let mut constant = to_screaming_snake_case(name);
    if constant.is_empty() || constant.starts_with(|c: char| c.is_ascii_digit()) {
        constant.insert(0, '_');
    }
    constant
}

pub(crate) fn generate_enum(
    cx: &CodegenContext<'_>,
    writers: &mut WriterDelegator,
    shape: &Shape,
    values: &[EnumValue],
) -> Result<()> {
    let symbol = cx.symbol(&shape.id)?;
    writers.use_shape_writer(&symbol, |w| {
        w.with_state(Some(Section::Enum(shape.id.clone())), |w| {
            w.open_block("class $L($T):", args![symbol.name(), &runtime::str_enum()], |w| {
                if let Some(docs) = shape.traits.documentation() {
                    w.write_docs(docs);
                    w.newline();
                }
                if values.is_empty() {
                    w.write("pass", args![])?;
                }
                for value in values {
                    w.write("$L = $S", args![constant_name(&value.name), &value.value])?;
                    if let Some(docs) = &value.documentation {
                        w.write_docs(docs);
                    }
                }
                Ok(())
            })
        })?;
        separate(w);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::constant_name;
    use test_case::test_case;

    #[test_case("RED" => "RED"; "already screaming")]
    #[test_case("darkBlue" => "DARK_BLUE"; "camel case")]
    #[test_case("2xl" => "_2XL"; "leading digit")]
    fn enum_constants(name: &str) -> String {
        constant_name(name)
    }
}
