//! Templated python source writer
//!
//! - `Writer` is the raw byte buffer
//! - `CodeWriter` adds indentation, templates, scoped context frames,
//!   interceptable sections, and import tracking for one file
//! - `WriterDelegator` owns one `CodeWriter` per output file and flushes them
//!   all at once into a `FileManifest`
//!
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::{
    error::{Error, Result},
    model::ShapeId,
    runtime,
    symbols::{PythonDependency, Symbol},
    Bytes, BytesMut, GENERATED_MARKER,
};

const INDENT: usize = 4;

#[derive(Default)]
pub struct Writer {
    writer: BytesMut,
}

impl Writer {
    #[inline]
    pub fn write(&mut self, bytes: &[u8]) {
        self.writer.extend_from_slice(bytes);
    }

    /// Returns the current buffer, zeroing out self
    pub fn take(&mut self) -> BytesMut {
        self.writer.split_to(self.writer.len())
    }

    /// Returns current position
    pub fn pos(&self) -> usize {
        self.writer.len()
    }

    /// Returns slice from writer
    pub fn get_slice(&self, start_pos: usize, end_pos: usize) -> &[u8] {
        &self.writer[start_pos..end_pos]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.writer
    }

    pub fn truncate(&mut self, pos: usize) {
        self.writer.truncate(pos)
    }
}

/// Named interception points. Generators wrap the code they emit for each
/// of these in `CodeWriter::with_state`, so integrations can add to or replace it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    Structure(ShapeId),
    Union(ShapeId),
    UnionMember(ShapeId),
    Enum(ShapeId),
    Collection(ShapeId),
    Schema(ShapeId),
    ServiceErrors,
    ConfigProperties,
    ClientClass(ShapeId),
    Operation(ShapeId),
    AuthResolver(ShapeId),
    Custom(String),
}

pub type SectionWriter = Arc<dyn Fn(&mut CodeWriter) -> Result<()> + Send + Sync>;
/// receives the text the section would otherwise contain
pub type SectionReplacer = Arc<dyn Fn(&mut CodeWriter, &str) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub enum InterceptorAction {
    Prepend(SectionWriter),
    Append(SectionWriter),
    Replace(SectionReplacer),
}

/// Code contributed to a section by an integration.
/// Higher priority runs first.
#[derive(Clone)]
pub struct Interceptor {
    section: Section,
    priority: i8,
    action: InterceptorAction,
}

impl Interceptor {
    pub fn prepend<F>(section: Section, priority: i8, f: F) -> Self
    where
        F: Fn(&mut CodeWriter) -> Result<()> + Send + Sync + 'static,
    {
        Interceptor { section, priority, action: InterceptorAction::Prepend(Arc::new(f)) }
    }

    pub fn append<F>(section: Section, priority: i8, f: F) -> Self
    where
        F: Fn(&mut CodeWriter) -> Result<()> + Send + Sync + 'static,
    {
        Interceptor { section, priority, action: InterceptorAction::Append(Arc::new(f)) }
    }

    pub fn replace<F>(section: Section, priority: i8, f: F) -> Self
    where
        F: Fn(&mut CodeWriter, &str) -> Result<()> + Send + Sync + 'static,
    {
        Interceptor { section, priority, action: InterceptorAction::Replace(Arc::new(f)) }
    }

    pub fn section(&self) -> &Section {
        &self.section
    }

    pub fn priority(&self) -> i8 {
        self.priority
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.action {
            InterceptorAction::Prepend(_) => "prepend",
            InterceptorAction::Append(_) => "append",
            InterceptorAction::Replace(_) => "replace",
        };
        f.debug_struct("Interceptor")
            .field("section", &self.section)
            .field("priority", &self.priority)
            .field("action", &kind)
            .finish()
    }
}

/// Interceptors registered for one generation run
#[derive(Clone, Debug, Default)]
pub struct InterceptorRegistry {
    interceptors: Vec<Interceptor>,
}

impl InterceptorRegistry {
    pub fn register(&mut self, interceptor: Interceptor) {
        self.interceptors.push(interceptor);
    }

    /// Interceptors for the section, highest priority first.
    /// Equal priorities keep registration order.
    pub fn for_section(&self, section: &Section) -> Vec<Interceptor> {
        let mut found = self
            .interceptors
            .iter()
            .filter(|i| &i.section == section)
            .cloned()
            .collect::<Vec<_>>();
        found.sort_by(|a, b| b.priority.cmp(&a.priority));
        found
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

/// Value stored in a context frame, for `${name:L}` and `${name:T}`
#[derive(Clone, Debug, PartialEq)]
pub enum ContextValue {
    Literal(String),
    Symbol(Symbol),
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Literal(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Literal(s)
    }
}

impl From<&Symbol> for ContextValue {
    fn from(s: &Symbol) -> Self {
        ContextValue::Symbol(s.clone())
    }
}

/// Lazily evaluated block of code
pub type Block<'a> = Box<dyn FnOnce(&mut CodeWriter) -> Result<()> + 'a>;

/// Template argument
pub enum Arg<'a> {
    /// `$L`, or `$S` to quote it
    Literal(String),
    /// symbol reference for `$T`
    Symbol(Symbol),
    /// symbol reference for `$T`, written as a quoted forward reference
    Deferred(Symbol),
    /// `$C`
    Block(Block<'a>),
}

impl<'a> Arg<'a> {
    pub fn lit<T: std::fmt::Display>(value: T) -> Self {
        Arg::Literal(value.to_string())
    }

    pub fn symbol(symbol: &Symbol) -> Self {
        Arg::Symbol(symbol.clone())
    }

    /// symbol reference, deferred if `deferred` is true
    pub fn type_ref(symbol: &Symbol, deferred: bool) -> Self {
        if deferred {
            Arg::Deferred(symbol.clone())
        } else {
            Arg::Symbol(symbol.clone())
        }
    }

    pub fn block<F>(f: F) -> Self
    where
        F: FnOnce(&mut CodeWriter) -> Result<()> + 'a,
    {
        Arg::Block(Box::new(f))
    }

    fn describe(&self) -> &'static str {
        match self {
            Arg::Literal(_) => "literal",
            Arg::Symbol(_) | Arg::Deferred(_) => "symbol",
            Arg::Block(_) => "block",
        }
    }
}

impl<'a> From<&str> for Arg<'a> {
    fn from(s: &str) -> Self {
        Arg::Literal(s.to_string())
    }
}

impl<'a> From<String> for Arg<'a> {
    fn from(s: String) -> Self {
        Arg::Literal(s)
    }
}

impl<'a> From<&String> for Arg<'a> {
    fn from(s: &String) -> Self {
        Arg::Literal(s.clone())
    }
}

impl<'a> From<&Symbol> for Arg<'a> {
    fn from(s: &Symbol) -> Self {
        Arg::Symbol(s.clone())
    }
}

/// Builds a `Vec<Arg>` for `CodeWriter::write`
#[macro_export]
macro_rules! args {
    () => { Vec::<$crate::writer::Arg>::new() };
    ($($arg:expr),+ $(,)?) => { vec![$($crate::writer::Arg::from($arg)),+] };
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Format {
    Literal,
    Str,
    Type,
    Code,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ArgIndex {
    Relative,
    Position(usize),
}

#[derive(Debug, PartialEq)]
enum Token<'t> {
    Text(&'t str),
    Dollar,
    Arg { index: ArgIndex, format: Format },
    Named { name: &'t str, format: Format },
}

fn parse_format(c: Option<char>) -> std::result::Result<Format, String> {
    match c {
        Some('L') => Ok(Format::Literal),
        Some('S') => Ok(Format::Str),
        Some('T') => Ok(Format::Type),
        Some('C') => Ok(Format::Code),
        Some(c) => Err(format!("unknown format character '{}'", c)),
        None => Err("missing format character".to_string()),
    }
}

/// Parses the text after a '$'. Returns the token and the number of bytes consumed.
fn parse_placeholder(rest: &str) -> std::result::Result<(Token<'_>, usize), String> {
    match rest.chars().next() {
        None => Err("dangling '$'".to_string()),
        Some('$') => Ok((Token::Dollar, 1)),
        Some('{') => {
            let end = rest.find('}').ok_or_else(|| "unterminated '${'".to_string())?;
            let inner = &rest[1..end];
            if inner == "C|" {
                return Ok((Token::Arg { index: ArgIndex::Relative, format: Format::Code }, end + 1));
            }
            let (name, format) =
                inner.split_once(':').ok_or_else(|| format!("expected '${{name:K}}', found '{}'", inner))?;
            let format = parse_format(format.chars().next())?;
            if name.is_empty() || format == Format::Code {
                return Err(format!("invalid named placeholder '{}'", inner));
            }
            Ok((Token::Named { name, format }, end + 1))
        }
        Some(c) if c.is_ascii_digit() => {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            let position: usize = rest[..digits].parse().map_err(|_| "bad position".to_string())?;
            if position == 0 {
                return Err("positions start at 1".to_string());
            }
            let format = parse_format(rest[digits..].chars().next())?;
            Ok((Token::Arg { index: ArgIndex::Position(position), format }, digits + 1))
        }
        Some(c) => Ok((Token::Arg { index: ArgIndex::Relative, format: parse_format(Some(c))? }, 1)),
    }
}

fn parse_template(template: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    while let Some(offset) = template[i..].find('$') {
        let dollar = i + offset;
        if text_start < dollar {
            tokens.push(Token::Text(&template[text_start..dollar]));
        }
        let (token, consumed) = parse_placeholder(&template[dollar + 1..])
            .map_err(|msg| Error::Template(format!("{} in template {:?}", msg, template)))?;
        tokens.push(token);
        i = dollar + 1 + consumed;
        text_start = i;
    }
    if text_start < template.len() {
        tokens.push(Token::Text(&template[text_start..]));
    }
    Ok(tokens)
}

/// Quotes a string as a python string literal
pub fn python_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Imports needed by one python file
#[derive(Debug, Default)]
pub struct ImportContainer {
    from_imports: BTreeMap<String, BTreeSet<(String, Option<String>)>>,
    module_imports: BTreeSet<String>,
}

impl ImportContainer {
    pub fn add(&mut self, module: &str, name: &str, alias: Option<&str>) {
        self.from_imports
            .entry(module.to_string())
            .or_default()
            .insert((name.to_string(), alias.map(|a| a.to_string())));
    }

    /// `import module`
    pub fn add_module(&mut self, module: &str) {
        self.module_imports.insert(module.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.from_imports.is_empty() && self.module_imports.is_empty()
    }

    /// Renders import statements in three groups: standard library,
    /// third party, then modules of `package`
    pub fn render(&self, package: &str) -> String {
        let group_of = |module: &str| {
            if runtime::is_stdlib_module(module) {
                0
            } else if module == package || module.starts_with(&format!("{}.", package)) {
                2
            } else {
                1
            }
        };
        let mut groups: [Vec<String>; 3] = Default::default();
        for module in self.module_imports.iter() {
            groups[group_of(module)].push(format!("import {}", module));
        }
        for (module, names) in self.from_imports.iter() {
            let names = names
                .iter()
                .map(|(name, alias)| match alias {
                    Some(alias) => format!("{} as {}", name, alias),
                    None => name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            groups[group_of(module)].push(format!("from {} import {}", module, names));
        }
        groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| g.join("\n"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug)]
struct Frame {
    values: HashMap<String, ContextValue>,
    section: Option<Section>,
    start: usize,
    indent_level: usize,
    block_indent: usize,
}

/// Writer for one python file
pub struct CodeWriter {
    namespace: String,
    package: String,
    buf: Writer,
    imports: ImportContainer,
    dependencies: BTreeSet<PythonDependency>,
    frames: Vec<Frame>,
    interceptors: Arc<InterceptorRegistry>,
    indent_level: usize,
    block_indent: usize,
    at_line_start: bool,
    column: usize,
}

impl CodeWriter {
    /// Creates a writer for the python module `namespace`, in `package`
    pub fn new(namespace: &str, package: &str, interceptors: Arc<InterceptorRegistry>) -> Self {
        CodeWriter {
            namespace: namespace.to_string(),
            package: package.to_string(),
            buf: Writer::default(),
            imports: ImportContainer::default(),
            dependencies: BTreeSet::new(),
            frames: vec![Frame {
                values: HashMap::new(),
                section: None,
                start: 0,
                indent_level: 0,
                block_indent: 0,
            }],
            interceptors,
            indent_level: 0,
            block_indent: 0,
            at_line_start: true,
            column: 0,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dependencies(&self) -> &BTreeSet<PythonDependency> {
        &self.dependencies
    }

    /// text written so far, without header and imports
    pub fn body(&self) -> String {
        String::from_utf8_lossy(self.buf.as_slice()).into_owned()
    }

    /// Writes the template followed by a newline
    pub fn write(&mut self, template: &str, args: Vec<Arg<'_>>) -> Result<()> {
        self.expand(template, args)?;
        self.put_str("\n");
        Ok(())
    }

    /// Writes the template without a trailing newline
    pub fn write_inline(&mut self, template: &str, args: Vec<Arg<'_>>) -> Result<()> {
        self.expand(template, args)
    }

    pub fn newline(&mut self) {
        self.put_str("\n");
    }

    /// Writes a header line, then runs `body` one level deeper
    pub fn open_block<F>(&mut self, header: &str, args: Vec<Arg<'_>>, body: F) -> Result<()>
    where
        F: FnOnce(&mut CodeWriter) -> Result<()>,
    {
        self.write(header, args)?;
        self.indent();
        let result = body(self);
        self.dedent();
        result
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    /// Writes a docstring. Nothing is written for empty docs.
    pub fn write_docs(&mut self, docs: &str) {
        let docs = docs.trim();
        if docs.is_empty() {
            return;
        }
        let mut escaped = docs.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
        // a quote right before the closing delimiter would end the string early
        let trailing_quote = escaped
            .strip_suffix('"')
            .map(|rest| rest.chars().rev().take_while(|c| *c == '\\').count() % 2 == 0);
        if trailing_quote == Some(true) {
            escaped.insert(escaped.len() - 1, '\\');
        }
        if escaped.contains('\n') {
            self.put_str("\"\"\"");
            self.put_str(&escaped);
            self.put_str("\n\"\"\"\n");
        } else {
            self.put_str(&format!("\"\"\"{}\"\"\"\n", escaped));
        }
    }

    /// Records an import for a symbol and its references, and its dependencies.
    /// Symbols in this writer's module and builtins are not imported.
    pub fn add_import(&mut self, symbol: &Symbol) {
        for dep in symbol.dependencies() {
            self.dependencies.insert(dep.clone());
        }
        if !symbol.is_builtin() && symbol.namespace() != self.namespace {
            self.imports.add(symbol.namespace(), symbol.name(), symbol.alias());
        }
        for reference in symbol.references() {
            self.add_import(reference);
        }
    }

    /// `import module`
    pub fn add_module_import(&mut self, module: &str) {
        self.imports.add_module(module);
    }

    pub fn add_dependency(&mut self, dependency: PythonDependency) {
        self.dependencies.insert(dependency);
    }

    /// text to use for a symbol in this file
    fn symbol_text(&self, symbol: &Symbol) -> String {
        if symbol.namespace() == self.namespace {
            symbol.name().to_string()
        } else {
            symbol.imported_name().to_string()
        }
    }

    /// Imports the symbol and returns the text that refers to it in this file
    pub fn reference(&mut self, symbol: &Symbol) -> String {
        self.add_import(symbol);
        self.symbol_text(symbol)
    }

    /// Adds a value to the current context frame
    pub fn put_context<V: Into<ContextValue>>(&mut self, key: &str, value: V) {
        if let Some(frame) = self.frames.last_mut() {
            frame.values.insert(key.to_string(), value.into());
        }
    }

    /// Looks up a context value, innermost frame first
    pub fn get_context(&self, key: &str) -> Option<&ContextValue> {
        self.frames.iter().rev().find_map(|f| f.values.get(key))
    }

    /// Pushes a new context frame. If the frame is a section,
    /// `prepend` interceptors for the section run now.
    pub fn push_state(&mut self, section: Option<Section>) -> Result<()> {
        self.frames.push(Frame {
            values: HashMap::new(),
            section: section.clone(),
            start: self.buf.pos(),
            indent_level: self.indent_level,
            block_indent: self.block_indent,
        });
        if let Some(section) = section {
            for interceptor in self.interceptors.clone().for_section(&section) {
                if let InterceptorAction::Prepend(f) = &interceptor.action {
                    if let Err(e) = f(self) {
                        self.discard_state();
                        return Err(e);
                    }
                }
            }
            let pos = self.buf.pos();
            if let Some(frame) = self.frames.last_mut() {
                frame.start = pos;
            }
        }
        Ok(())
    }

    /// Pops the current frame. If the frame is a section, `replace` and then
    /// `append` interceptors run first. The frame is popped even if one fails.
    pub fn pop_state(&mut self) -> Result<()> {
        if self.frames.len() <= 1 {
            return Err(Error::Writer("pop_state called without push_state".to_string()));
        }
        let result = self.run_closing_interceptors();
        self.discard_state();
        result
    }

    /// Runs `f` inside a new frame, popping it whether or not `f` succeeds
    pub fn with_state<F>(&mut self, section: Option<Section>, f: F) -> Result<()>
    where
        F: FnOnce(&mut CodeWriter) -> Result<()>,
    {
        self.push_state(section)?;
        match f(self) {
            Ok(()) => self.pop_state(),
            Err(e) => {
                self.discard_state();
                Err(e)
            }
        }
    }

    fn discard_state(&mut self) {
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop() {
                self.indent_level = frame.indent_level;
                self.block_indent = frame.block_indent;
            }
        }
    }

    fn run_closing_interceptors(&mut self) -> Result<()> {
        let (section, start) = match self.frames.last() {
            Some(Frame { section: Some(section), start, .. }) => (section.clone(), *start),
            _ => return Ok(()),
        };
        let interceptors = self.interceptors.clone().for_section(&section);
        for interceptor in interceptors.iter() {
            if let InterceptorAction::Replace(f) = &interceptor.action {
                let previous =
                    String::from_utf8_lossy(self.buf.get_slice(start, self.buf.pos())).into_owned();
                self.reset_to(start);
                f(self, &previous)?;
            }
        }
        for interceptor in interceptors.iter() {
            if let InterceptorAction::Append(f) = &interceptor.action {
                f(self)?;
            }
        }
        Ok(())
    }

    /// truncates the buffer and recomputes line state
    fn reset_to(&mut self, pos: usize) {
        self.buf.truncate(pos);
        self.recompute_line_state();
    }

    fn recompute_line_state(&mut self) {
        let text = self.buf.as_slice();
        let line_start = text.iter().rposition(|b| *b == b'\n').map(|p| p + 1).unwrap_or(0);
        let line_len = text.len() - line_start;
        self.at_line_start = line_len == 0;
        self.column = line_len.saturating_sub(self.prefix_len());
    }

    fn prefix_len(&self) -> usize {
        self.indent_level * INDENT + self.block_indent
    }

    /// Writes text, indenting each new non-empty line
    fn put_str(&mut self, text: &str) {
        for piece in text.split_inclusive('\n') {
            let (content, newline) = match piece.strip_suffix('\n') {
                Some(content) => (content, true),
                None => (piece, false),
            };
            if !content.is_empty() {
                if self.at_line_start {
                    let prefix = " ".repeat(self.prefix_len());
                    self.buf.write(prefix.as_bytes());
                    self.at_line_start = false;
                }
                self.buf.write(content.as_bytes());
                self.column += content.len();
            }
            if newline {
                self.buf.write(b"\n");
                self.at_line_start = true;
                self.column = 0;
            }
        }
    }

    fn expand(&mut self, template: &str, args: Vec<Arg<'_>>) -> Result<()> {
        let tokens = parse_template(template)?;
        let mut args = args.into_iter().map(Some).collect::<Vec<_>>();

        let relative = tokens
            .iter()
            .filter(|t| matches!(t, Token::Arg { index: ArgIndex::Relative, .. }))
            .count();
        let positions = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Arg { index: ArgIndex::Position(p), .. } => Some(*p),
                _ => None,
            })
            .collect::<BTreeSet<_>>();
        if relative > 0 && !positions.is_empty() {
            return Err(Error::Template(format!(
                "relative and positional arguments mixed in template {:?}",
                template
            )));
        }
        if positions.is_empty() && relative != args.len() {
            return Err(Error::Template(format!(
                "template {:?} expects {} arguments, found {}",
                template,
                relative,
                args.len()
            )));
        }
        if !positions.is_empty() && positions.iter().copied().ne(1..=args.len()) {
            return Err(Error::Template(format!(
                "template {:?} must use each of its {} arguments",
                template,
                args.len()
            )));
        }

        let mut next = 0;
        for token in tokens {
            match token {
                Token::Text(text) => self.put_str(text),
                Token::Dollar => self.put_str("$"),
                Token::Arg { index, format } => {
                    let ix = match index {
                        ArgIndex::Relative => {
                            next += 1;
                            next - 1
                        }
                        ArgIndex::Position(p) => p - 1,
                    };
                    self.write_arg(template, &mut args[ix], format)?;
                }
                Token::Named { name, format } => {
                    let value = self.get_context(name).cloned().ok_or_else(|| {
                        Error::Template(format!("no context value '{}' for template {:?}", name, template))
                    })?;
                    match (value, format) {
                        (ContextValue::Literal(s), Format::Literal) => self.put_str(&s),
                        (ContextValue::Literal(s), Format::Str) => self.put_str(&python_string(&s)),
                        (ContextValue::Symbol(sym), Format::Type) => {
                            self.add_import(&sym);
                            let text = self.symbol_text(&sym);
                            self.put_str(&text);
                        }
                        (_, format) => {
                            return Err(Error::Template(format!(
                                "context value '{}' can't be formatted as {:?}",
                                name, format
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn write_arg(&mut self, template: &str, slot: &mut Option<Arg<'_>>, format: Format) -> Result<()> {
        let mismatch = |arg: &Arg| {
            Error::Template(format!(
                "{:?} placeholder given a {} argument in template {:?}",
                format,
                arg.describe(),
                template
            ))
        };
        if let Some(Arg::Block(_)) = slot {
            return match (slot.take(), format) {
                (Some(Arg::Block(f)), Format::Code) => self.write_block(f),
                (Some(arg), _) => Err(mismatch(&arg)),
                (None, _) => Err(Error::Template(format!("empty argument in template {:?}", template))),
            };
        }
        match (slot.as_ref(), format) {
            (None, _) => Err(Error::Template(format!("block used twice in template {:?}", template))),
            (Some(Arg::Literal(s)), Format::Literal) => {
                let s = s.clone();
                self.put_str(&s);
                Ok(())
            }
            (Some(Arg::Literal(s)), Format::Str) => {
                let quoted = python_string(s);
                self.put_str(&quoted);
                Ok(())
            }
            (Some(Arg::Symbol(sym)), Format::Type) => {
                let sym = sym.clone();
                self.add_import(&sym);
                let text = self.symbol_text(&sym);
                self.put_str(&text);
                Ok(())
            }
            (Some(Arg::Deferred(sym)), Format::Type) => {
                let sym = sym.clone();
                self.add_import(&sym);
                let text = format!("\"{}\"", self.symbol_text(&sym));
                self.put_str(&text);
                Ok(())
            }
            (Some(arg), _) => Err(mismatch(arg)),
        }
    }

    /// Runs a lazy block. Lines after the first are indented to the
    /// placeholder's column; one trailing newline is dropped.
    fn write_block(&mut self, f: Block<'_>) -> Result<()> {
        let saved = self.block_indent;
        self.block_indent += self.column;
        let start = self.buf.pos();
        let result = f(self);
        self.block_indent = saved;
        result?;
        let pos = self.buf.pos();
        if pos > start && self.buf.get_slice(pos - 1, pos) == b"\n" {
            self.buf.truncate(pos - 1);
        }
        self.recompute_line_state();
        Ok(())
    }

    /// Renders the complete file: marker, imports, body
    pub fn render(&self) -> String {
        let mut out = String::from(GENERATED_MARKER);
        out.push('\n');
        let imports = self.imports.render(&self.package);
        if !imports.is_empty() {
            out.push('\n');
            out.push_str(&imports);
            out.push('\n');
        }
        let body = String::from_utf8_lossy(self.buf.as_slice());
        let body = body.trim_matches('\n');
        if !body.is_empty() {
            out.push_str("\n\n");
            out.push_str(body);
            out.push('\n');
        }
        out
    }
}

/// Generated files, keyed by path relative to the output directory
#[derive(Debug, Default)]
pub struct FileManifest {
    files: BTreeMap<PathBuf, Bytes>,
}

impl FileManifest {
    pub fn write_file<P: Into<PathBuf>, B: Into<Bytes>>(&mut self, path: P, contents: B) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&Bytes> {
        self.files.get(path)
    }

    /// Returns file contents as text
    pub fn get_str(&self, path: &str) -> Option<String> {
        self.files.get(Path::new(path)).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &Bytes)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Adds an empty `__init__.py` to every directory holding python files
    /// that doesn't already have one
    pub fn add_init_files(&mut self) {
        let mut dirs = BTreeSet::new();
        for path in self.files.keys() {
            if path.extension().map(|e| e == "py").unwrap_or(false) {
                let mut parent = path.parent();
                while let Some(dir) = parent {
                    if dir.as_os_str().is_empty() {
                        break;
                    }
                    dirs.insert(dir.to_path_buf());
                    parent = dir.parent();
                }
            }
        }
        for dir in dirs {
            let init = dir.join("__init__.py");
            if !self.files.contains_key(&init) {
                debug!(path = %init.display(), "adding init file");
                self.files.insert(init, Bytes::new());
            }
        }
    }

    /// Writes all files under `output_dir`, creating directories as needed
    pub fn write_to_dir(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (path, contents) in self.files.iter() {
            let full = output_dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Io(format!("creating directory {}: {}", parent.display(), e)))?;
            }
            std::fs::write(&full, contents)
                .map_err(|e| Error::Io(format!("writing output file {}: {}", full.display(), e)))?;
            written.push(full);
        }
        Ok(written)
    }
}

/// Hands out one writer per file. Nothing is rendered until `flush`.
pub struct WriterDelegator {
    package: String,
    writers: BTreeMap<String, CodeWriter>,
    interceptors: Arc<InterceptorRegistry>,
}

impl WriterDelegator {
    pub fn new(package: &str, interceptors: Arc<InterceptorRegistry>) -> Self {
        WriterDelegator { package: package.to_string(), writers: BTreeMap::new(), interceptors }
    }

    /// Runs `f` with the writer for `path`, creating it for module `namespace` if needed
    pub fn use_file_writer<F>(&mut self, path: &str, namespace: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut CodeWriter) -> Result<()>,
    {
        let package = &self.package;
        let interceptors = &self.interceptors;
        let writer = self
            .writers
            .entry(path.to_string())
            .or_insert_with(|| CodeWriter::new(namespace, package, interceptors.clone()));
        if writer.namespace() != namespace {
            return Err(Error::Writer(format!(
                "file {} is module {}, not {}",
                path,
                writer.namespace(),
                namespace
            )));
        }
        f(writer)
    }

    /// Runs `f` with the writer for the file that declares `symbol`
    pub fn use_shape_writer<F>(&mut self, symbol: &Symbol, f: F) -> Result<()>
    where
        F: FnOnce(&mut CodeWriter) -> Result<()>,
    {
        let path = symbol
            .definition_file()
            .ok_or_else(|| Error::Writer(format!("symbol {} is not declared in a file", symbol)))?
            .to_string();
        let namespace = symbol.namespace().to_string();
        self.use_file_writer(&path, &namespace, f)
    }

    pub fn has_writer(&self, path: &str) -> bool {
        self.writers.contains_key(path)
    }

    /// Dependencies of every symbol written so far
    pub fn dependencies(&self) -> BTreeSet<PythonDependency> {
        self.writers.values().flat_map(|w| w.dependencies().iter().cloned()).collect()
    }

    /// Renders every writer into the manifest
    pub fn flush(self, manifest: &mut FileManifest) {
        for (path, writer) in self.writers {
            let text = writer.render();
            manifest.write_file(path, Bytes::from(text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    fn writer() -> CodeWriter {
        CodeWriter::new("shop.models", "shop", Arc::new(InterceptorRegistry::default()))
    }

    fn writer_with(interceptors: Vec<Interceptor>) -> CodeWriter {
        let mut registry = InterceptorRegistry::default();
        for i in interceptors {
            registry.register(i);
        }
        CodeWriter::new("shop.models", "shop", Arc::new(registry))
    }

    #[test]
    fn literal_string_and_escape() {
        let mut w = writer();
        w.write("x = $S  # costs $$$L", args!["a \"b\"", "5"]).unwrap();
        assert_eq!(w.body(), "x = \"a \\\"b\\\"\"  # costs $5\n");
    }

    #[test]
    fn positional_arguments_can_repeat() {
        let mut w = writer();
        w.write("$1L + $2L + $1L", args!["a", "b"]).unwrap();
        assert_eq!(w.body(), "a + b + a\n");
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let mut w = writer();
        assert!(matches!(w.write("$L $L", args!["a"]), Err(Error::Template(_))));
        assert!(matches!(w.write("$L", args!["a", "b"]), Err(Error::Template(_))));
        assert!(matches!(w.write("$1L $L", args!["a", "b"]), Err(Error::Template(_))));
        assert!(matches!(w.write("$2L", args!["a", "b"]), Err(Error::Template(_))));
        assert!(matches!(w.write("$Q", args!["a"]), Err(Error::Template(_))));
        assert!(matches!(w.write("cost $", args![]), Err(Error::Template(_))));
    }

    #[test]
    fn format_mismatch_is_an_error() {
        let mut w = writer();
        assert!(matches!(w.write("$T", args!["a"]), Err(Error::Template(_))));
        let sym = Symbol::new("Order", "shop.models");
        assert!(matches!(w.write("$L", args![&sym]), Err(Error::Template(_))));
    }

    #[test]
    fn symbols_record_imports() {
        let mut w = writer();
        let local = Symbol::new("Order", "shop.models");
        let schema = Symbol::new("ORDER", "shop._private.schemas").with_alias("_SCHEMA_ORDER");
        let list = Symbol::builtin("list[datetime]").with_reference(Symbol::new("datetime", "datetime"));
        w.write("a: $T = $T", args![&local, &schema]).unwrap();
        w.write("b: $T", args![&list]).unwrap();
        w.write("c: $T", vec![Arg::type_ref(&local, true)]).unwrap();
        assert_eq!(w.body(), "a: Order = _SCHEMA_ORDER\nb: list[datetime]\nc: \"Order\"\n");
        let rendered = w.render();
        assert_eq!(
            rendered,
            format!(
                "{}\n\nfrom datetime import datetime\n\nfrom shop._private.schemas import ORDER as _SCHEMA_ORDER\n\n\n{}",
                GENERATED_MARKER,
                "a: Order = _SCHEMA_ORDER\nb: list[datetime]\nc: \"Order\"\n"
            )
        );
    }

    #[test]
    fn import_groups() {
        let mut imports = ImportContainer::default();
        imports.add("shop.models", "Order", None);
        imports.add("smithy_core.schemas", "Schema", None);
        imports.add("dataclasses", "field", None);
        imports.add("dataclasses", "dataclass", None);
        imports.add_module("logging");
        assert_eq!(
            imports.render("shop"),
            "import logging\nfrom dataclasses import dataclass, field\n\n\
             from smithy_core.schemas import Schema\n\n\
             from shop.models import Order"
        );
    }

    #[test]
    fn blocks_indent_to_column() {
        let mut w = writer();
        w.write(
            "result = $C",
            vec![Arg::block(|w: &mut CodeWriter| {
                w.write("[", args![])?;
                w.write("    1,", args![])?;
                w.write("]", args![])
            })],
        )
        .unwrap();
        assert_eq!(w.body(), "result = [\n             1,\n         ]\n");
    }

    #[test]
    fn column_block_syntax_and_nesting() {
        let mut w = writer();
        w.open_block("def f():", args![], |w| {
            w.write(
                "return ${C|}",
                vec![Arg::block(|w: &mut CodeWriter| w.write("a +\nb", args![]))],
            )
        })
        .unwrap();
        assert_eq!(w.body(), "def f():\n    return a +\n           b\n");
    }

    #[test]
    fn named_context_values() {
        let mut w = writer();
        w.put_context("name", "Order");
        w.with_state(None, |w| {
            w.put_context("kind", "structure");
            w.write("${name:L} is a ${kind:S}", args![])
        })
        .unwrap();
        assert!(w.get_context("kind").is_none());
        assert!(matches!(w.write("${kind:L}", args![]), Err(Error::Template(_))));
        assert_eq!(w.body(), "Order is a \"structure\"\n");
    }

    #[test]
    fn state_pops_on_error() {
        let mut w = writer();
        w.indent();
        let err = w.with_state(None, |w| {
            w.indent();
            w.put_context("x", "1");
            Err(Error::Other("boom".to_string()))
        });
        assert!(err.is_err());
        assert!(w.get_context("x").is_none());
        w.write("y", args![]).unwrap();
        assert_eq!(w.body(), "    y\n");
        assert!(matches!(w.pop_state(), Err(Error::Writer(_))));
    }

    #[test]
    fn interceptors_wrap_sections() {
        let section = Section::Custom("greeting".to_string());
        let mut w = writer_with(vec![
            Interceptor::append(section.clone(), 0, |w| w.write("# after", args![])),
            Interceptor::prepend(section.clone(), 0, |w| w.write("# before", args![])),
            Interceptor::prepend(section.clone(), 5, |w| w.write("# first", args![])),
        ]);
        w.with_state(Some(section), |w| w.write("hello()", args![])).unwrap();
        assert_eq!(w.body(), "# first\n# before\nhello()\n# after\n");
    }

    #[test]
    fn replace_sees_default_body() {
        let section = Section::Custom("body".to_string());
        let mut w = writer_with(vec![Interceptor::replace(section.clone(), 0, |w, previous| {
            w.write("# was: $L", args![previous.trim()])
        })]);
        w.write("start", args![]).unwrap();
        w.with_state(Some(section), |w| w.write("default()", args![])).unwrap();
        assert_eq!(w.body(), "start\n# was: default()\n");
    }

    #[test]
    fn interceptors_for_other_sections_do_not_run() {
        let mut w = writer_with(vec![Interceptor::append(Section::ServiceErrors, 0, |w| {
            w.write("nope", args![])
        })]);
        w.with_state(Some(Section::ConfigProperties), |w| w.write("yes", args![])).unwrap();
        assert_eq!(w.body(), "yes\n");
    }

    #[test]
    fn docstrings() {
        let mut w = writer();
        w.write_docs("One line.");
        w.write_docs("");
        w.write_docs("Two\nlines.");
        assert_eq!(w.body(), "\"\"\"One line.\"\"\"\n\"\"\"Two\nlines.\n\"\"\"\n");
    }

    #[test]
    fn docstrings_ending_in_a_quote() {
        let mut w = writer();
        w.write_docs("Set mode to \"fast\"");
        w.write_docs("Ends with \"\"\"");
        w.write_docs("Quote \\\"");
        assert_eq!(
            w.body(),
            "\"\"\"Set mode to \"fast\\\"\"\"\"\n\
             \"\"\"Ends with \\\"\\\"\\\"\"\"\"\n\
             \"\"\"Quote \\\\\\\"\"\"\"\n"
        );
    }

    #[test]
    fn delegator_flushes_all_files() {
        let registry = Arc::new(InterceptorRegistry::default());
        let mut delegator = WriterDelegator::new("shop", registry);
        let order = Symbol::new("Order", "shop.models").with_definition_file("shop/models.py");
        delegator.use_shape_writer(&order, |w| w.write("class Order: ...", args![])).unwrap();
        delegator
            .use_file_writer("shop/_private/schemas.py", "shop._private.schemas", |w| {
                w.write("ORDER = 1", args![])
            })
            .unwrap();
        // later writes land in the same file
        delegator.use_shape_writer(&order, |w| w.write("class Other: ...", args![])).unwrap();
        assert!(delegator
            .use_file_writer("shop/models.py", "shop.other", |_| Ok(()))
            .is_err());

        let mut manifest = FileManifest::default();
        delegator.flush(&mut manifest);
        manifest.add_init_files();
        let models = manifest.get_str("shop/models.py").unwrap();
        assert!(models.starts_with(GENERATED_MARKER));
        assert!(models.ends_with("class Order: ...\nclass Other: ...\n"));
        assert!(manifest.has_file(Path::new("shop/__init__.py")));
        assert!(manifest.has_file(Path::new("shop/_private/__init__.py")));
        assert_eq!(manifest.len(), 4);
    }

    #[test]
    fn manifest_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = FileManifest::default();
        manifest.write_file("pkg/a.py", Bytes::from_static(b"x = 1\n"));
        manifest.add_init_files();
        let written = manifest.write_to_dir(dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        let text = std::fs::read_to_string(dir.path().join("pkg/a.py")).unwrap();
        assert_eq!(text, "x = 1\n");
    }
}
