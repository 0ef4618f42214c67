use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use swc_core::{
    common::{sync::Lrc, FileName, SourceFile, SourceMap, Span, SyntaxContext, DUMMY_SP},
    ecma::{
        ast::*,
        codegen::{text_writer::JsWriter, Emitter, Node},
        parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax},
        visit::{VisitMut, VisitMutWith},
    },
};
use thiserror::Error;

/// Namespace the generated type references hang off of, e.g. `PropTypes.bool`.
const TYPE_NAMESPACE: &str = "PropTypes";

// -----------------------------------------------------------------------------
// Property descriptor
// -----------------------------------------------------------------------------

/// One property to insert: its name, its checker tag, and an optional default.
///
/// A descriptor without a usable default is a required property; required
/// properties get an `.isRequired` marker and never receive a default entry.
/// The serde names match the JSON shape the editor glue sends across the
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(rename = "propertyName")]
    pub property_name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(rename = "isRequired", default)]
    pub is_required: bool,
    #[serde(rename = "defaultValue", default)]
    pub default_value: Option<String>,
}

impl PropertyDescriptor {
    /// Builds a trimmed descriptor, deriving `is_required` from the default.
    /// Returns `None` when the name or type is blank.
    pub fn new(
        property_name: &str,
        type_tag: &str,
        default_value: Option<&str>,
    ) -> Option<Self> {
        let property_name = property_name.trim();
        let type_tag = type_tag.trim();
        if property_name.is_empty() || type_tag.is_empty() {
            return None;
        }
        let default_value = default_value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Some(Self {
            property_name: property_name.to_string(),
            type_tag: type_tag.to_string(),
            is_required: default_value.is_none(),
            default_value,
        })
    }
}

/// Parse a compact `name:type:default` input string.
///
/// Eg: `"myMethod:func:() => {}"` adds a `myMethod` prop of type `func` with
/// default `() => {}`. Only the first two colons split fields, so the default
/// may itself contain colons. A blank or missing default marks the property
/// required.
pub fn parse_descriptor(text: &str) -> Option<PropertyDescriptor> {
    let mut parts = text.splitn(3, ':');
    let name = parts.next()?;
    let type_tag = parts.next()?;
    PropertyDescriptor::new(name, type_tag, parts.next())
}

/// Parse a descriptor from the editor glue's JSON object
/// (`{"propertyName": ..., "type": ..., "defaultValue": ...}`), applying the
/// same trimming and required-derivation as [`parse_descriptor`].
pub fn parse_descriptor_json(text: &str) -> Option<PropertyDescriptor> {
    let raw: PropertyDescriptor = serde_json::from_str(text).ok()?;
    PropertyDescriptor::new(&raw.property_name, &raw.type_tag, raw.default_value.as_deref())
}

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

/// Which of the two component declarations is being talked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    PropTypes,
    DefaultProps,
}

impl DeclarationKind {
    fn member_name(self) -> &'static str {
        match self {
            DeclarationKind::PropTypes => "propTypes",
            DeclarationKind::DefaultProps => "defaultProps",
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.member_name())
    }
}

/// Everything that can stop an insertion. No variant leaves a half-patched
/// file behind: on error the caller's document is not to be touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error("source text could not be parsed: {0}")]
    Parse(String),
    #[error("no `{0}` assignment found")]
    DeclarationNotFound(DeclarationKind),
    #[error("`{0}` is not assigned a mergeable object literal")]
    MalformedShape(DeclarationKind),
    #[error("rewritten node carries no usable source span")]
    MissingSpan,
    #[error("rewritten spans overlap")]
    OverlappingSpans,
    #[error("failed to regenerate source text for a rewritten node")]
    Emit,
}

// -----------------------------------------------------------------------------
// Parser adapter
// -----------------------------------------------------------------------------

/// A parsed file plus the pieces needed to resolve node spans back to byte
/// ranges of the original text and to print individual nodes. Owned by a
/// single insertion call and dropped with it.
struct ParsedSource {
    cm: Lrc<SourceMap>,
    file: Lrc<SourceFile>,
    module: Module,
}

/// Parse module source that may contain JSX and optional static typing.
///
/// The first attempt uses ES syntax with JSX plus the experimental extensions
/// (spread, class properties, async generators, decorators, function bind);
/// sources carrying type annotations fall back to a TSX parse. Trees with
/// recovered errors are rejected outright, never rewritten.
fn parse_source(source: &str) -> Result<ParsedSource, InsertError> {
    let cm: Lrc<SourceMap> = Default::default();
    let file = cm.new_source_file(FileName::Anon.into(), source.to_string());

    let jsx = Syntax::Es(EsSyntax {
        jsx: true,
        fn_bind: true,
        decorators: true,
        export_default_from: true,
        allow_super_outside_method: true,
        ..Default::default()
    });
    let tsx = Syntax::Typescript(TsSyntax {
        tsx: true,
        decorators: true,
        ..Default::default()
    });

    let mut first_failure = None;
    for syntax in [jsx, tsx] {
        match try_parse(syntax, &file) {
            Ok(module) => return Ok(ParsedSource { cm, file, module }),
            Err(msg) => {
                first_failure.get_or_insert(msg);
            }
        }
    }
    Err(InsertError::Parse(first_failure.unwrap_or_default()))
}

fn try_parse(syntax: Syntax, file: &SourceFile) -> Result<Module, String> {
    let lexer = Lexer::new(syntax, EsVersion::Es2022, StringInput::from(file), None);
    let mut parser = Parser::new_from(lexer);
    let module = parser
        .parse_module()
        .map_err(|e| e.kind().msg().to_string())?;
    // A recovered tree can still carry bogus spans; refuse to rewrite from it.
    if let Some(err) = parser.take_errors().into_iter().next() {
        return Err(err.kind().msg().to_string());
    }
    Ok(module)
}

impl ParsedSource {
    /// Resolve a node span to a byte range of the original text. Dummy or
    /// out-of-range spans fail closed.
    fn span_range(&self, span: Span) -> Result<Range<usize>, InsertError> {
        if span.is_dummy() || span.lo < self.file.start_pos || span.hi < span.lo {
            return Err(InsertError::MissingSpan);
        }
        let start = (span.lo - self.file.start_pos).0 as usize;
        let end = (span.hi - self.file.start_pos).0 as usize;
        if end > self.file.src.len() {
            return Err(InsertError::MissingSpan);
        }
        Ok(start..end)
    }

    /// Print a single statement back to source text, without comments and
    /// without a trailing newline.
    fn emit_stmt(&self, stmt: &Stmt) -> Result<String, InsertError> {
        let mut buf = Vec::new();
        {
            let mut emitter = Emitter {
                cfg: Default::default(),
                cm: self.cm.clone(),
                comments: None,
                wr: JsWriter::new(self.cm.clone(), "\n", &mut buf, None),
            };
            stmt.emit_with(&mut emitter).map_err(|_| InsertError::Emit)?;
        }
        let text = String::from_utf8(buf).map_err(|_| InsertError::Emit)?;
        Ok(text.trim_end().to_string())
    }

    /// Pair a rewritten statement with the byte range it replaces.
    fn rewrite_for(&self, stmt: ExprStmt) -> Result<Rewrite, InsertError> {
        let range = self.span_range(stmt.span)?;
        let text = self.emit_stmt(&Stmt::Expr(stmt))?;
        Ok(Rewrite { range, text })
    }
}

// -----------------------------------------------------------------------------
// Declaration locator & property merger
// -----------------------------------------------------------------------------

/// Depth-first walker that binds the first `*.propTypes = {...}` and
/// `*.defaultProps = {...}` assignment statements and merges the new property
/// into each. Descent stops once both declarations are bound, and a bound
/// statement's own subtree is never searched, so the two recorded spans can
/// never nest.
struct PropertyInserter<'a> {
    descriptor: &'a PropertyDescriptor,
    prop_types: Option<ExprStmt>,
    default_props_found: bool,
    default_props: Option<ExprStmt>,
    error: Option<InsertError>,
}

impl<'a> PropertyInserter<'a> {
    fn new(descriptor: &'a PropertyDescriptor) -> Self {
        Self {
            descriptor,
            prop_types: None,
            default_props_found: false,
            default_props: None,
            error: None,
        }
    }

    fn complete(&self) -> bool {
        self.error.is_some() || (self.prop_types.is_some() && self.default_props_found)
    }

    fn bind(&mut self, kind: DeclarationKind, stmt: &mut ExprStmt) {
        // Required properties never receive a default; the declaration only
        // has to exist, its text stays byte-identical.
        if kind == DeclarationKind::DefaultProps && self.descriptor.is_required {
            self.default_props_found = true;
            return;
        }

        let Expr::Assign(assign) = &mut *stmt.expr else {
            return;
        };
        let props = match &mut *assign.right {
            Expr::Object(object) => std::mem::take(&mut object.props),
            _ => {
                self.error = Some(InsertError::MalformedShape(kind));
                return;
            }
        };

        let value = match kind {
            DeclarationKind::PropTypes => type_reference(self.descriptor),
            DeclarationKind::DefaultProps => default_value_expr(self.descriptor),
        };
        let Some(merged) = insert_sorted(props, &self.descriptor.property_name, value) else {
            self.error = Some(InsertError::MalformedShape(kind));
            return;
        };
        *assign.right = Expr::Object(ObjectLit {
            span: DUMMY_SP,
            props: merged,
        });

        match kind {
            DeclarationKind::PropTypes => self.prop_types = Some(stmt.clone()),
            DeclarationKind::DefaultProps => {
                self.default_props_found = true;
                self.default_props = Some(stmt.clone());
            }
        }
    }
}

impl VisitMut for PropertyInserter<'_> {
    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        if self.complete() {
            return;
        }
        items.visit_mut_children_with(self);
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        if self.complete() {
            return;
        }
        stmts.visit_mut_children_with(self);
    }

    fn visit_mut_expr_stmt(&mut self, stmt: &mut ExprStmt) {
        if self.complete() {
            return;
        }
        // First lexical occurrence wins; later ones are left untouched.
        match assignment_kind(&stmt.expr) {
            Some(kind @ DeclarationKind::PropTypes) if self.prop_types.is_none() => {
                self.bind(kind, stmt);
                return;
            }
            Some(kind @ DeclarationKind::DefaultProps) if !self.default_props_found => {
                self.bind(kind, stmt);
                return;
            }
            _ => {}
        }
        stmt.visit_mut_children_with(self);
    }
}

/// Classify an expression statement as one of the two target declarations:
/// a plain `=` assignment whose left side is a member access ending in
/// `propTypes` or `defaultProps` (case-sensitive).
fn assignment_kind(expr: &Expr) -> Option<DeclarationKind> {
    let Expr::Assign(assign) = expr else {
        return None;
    };
    if assign.op != AssignOp::Assign {
        return None;
    }
    let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &assign.left else {
        return None;
    };
    let MemberProp::Ident(prop) = &member.prop else {
        return None;
    };
    match prop.sym.as_ref() {
        "propTypes" => Some(DeclarationKind::PropTypes),
        "defaultProps" => Some(DeclarationKind::DefaultProps),
        _ => None,
    }
}

/// Build `PropTypes.<type_tag>`, with a trailing `.isRequired` accessor for
/// required properties.
fn type_reference(descriptor: &PropertyDescriptor) -> Expr {
    let mut expr = Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(Expr::Ident(Ident::new(
            TYPE_NAMESPACE.into(),
            DUMMY_SP,
            SyntaxContext::empty(),
        ))),
        prop: MemberProp::Ident(IdentName::new(
            descriptor.type_tag.as_str().into(),
            DUMMY_SP,
        )),
    });
    if descriptor.is_required {
        expr = Expr::Member(MemberExpr {
            span: DUMMY_SP,
            obj: Box::new(expr),
            prop: MemberProp::Ident(IdentName::new("isRequired".into(), DUMMY_SP)),
        });
    }
    expr
}

/// Compute the defaultProps value. An explicit default is spliced verbatim as
/// a raw identifier, so arbitrary user expressions (`() => {}`, `[1, 2]`)
/// survive codegen untouched. Without one, a fixed per-type table applies,
/// falling back to `null` for unknown tags.
fn default_value_expr(descriptor: &PropertyDescriptor) -> Expr {
    if let Some(raw) = &descriptor.default_value {
        return Expr::Ident(Ident::new(
            raw.as_str().into(),
            DUMMY_SP,
            SyntaxContext::empty(),
        ));
    }
    match descriptor.type_tag.as_str() {
        "bool" => Expr::Lit(Lit::Bool(Bool {
            span: DUMMY_SP,
            value: false,
        })),
        "string" => Expr::Lit(Lit::Str(Str {
            span: DUMMY_SP,
            value: "".into(),
            raw: Some("''".into()),
        })),
        "number" => Expr::Lit(Lit::Num(Number {
            span: DUMMY_SP,
            value: 0.0,
            raw: Some("0".into()),
        })),
        _ => Expr::Lit(Lit::Null(Null { span: DUMMY_SP })),
    }
}

/// Insert a `name: value` entry into an owned property list and return the
/// list re-sorted ascending by key name. An existing entry with the same
/// name is overwritten.
///
/// Keyless entries (spreads, computed keys) are kept only as a leading run,
/// where re-sorting the keyed entries after them cannot change which entry
/// wins at runtime. A keyless entry following a keyed one would have to move
/// relative to keys it overrides, so the merge is refused (`None`).
fn insert_sorted(props: Vec<PropOrSpread>, name: &str, value: Expr) -> Option<Vec<PropOrSpread>> {
    let mut merged: Vec<PropOrSpread> = Vec::with_capacity(props.len() + 1);
    let mut keyed: Vec<PropOrSpread> = Vec::with_capacity(props.len() + 1);
    for prop in props {
        match prop_key_name(&prop) {
            None if keyed.is_empty() => merged.push(prop),
            None => return None,
            Some(key) if key == name => {}
            Some(_) => keyed.push(prop),
        }
    }
    keyed.push(PropOrSpread::Prop(Box::new(Prop::KeyValue(KeyValueProp {
        key: PropName::Ident(IdentName::new(name.into(), DUMMY_SP)),
        value: Box::new(value),
    }))));
    // Stable byte-wise ordering; identifier keys are ASCII in practice and
    // byte order is deterministic across environments, unlike locale tables.
    keyed.sort_by_key(|prop| prop_key_name(prop).unwrap_or_default());
    merged.extend(keyed);
    Some(merged)
}

fn prop_key_name(prop: &PropOrSpread) -> Option<String> {
    let PropOrSpread::Prop(prop) = prop else {
        return None;
    };
    match &**prop {
        Prop::Shorthand(ident) => Some(ident.sym.to_string()),
        Prop::KeyValue(kv) => prop_name_text(&kv.key),
        Prop::Assign(assign) => Some(assign.key.sym.to_string()),
        Prop::Getter(getter) => prop_name_text(&getter.key),
        Prop::Setter(setter) => prop_name_text(&setter.key),
        Prop::Method(method) => prop_name_text(&method.key),
    }
}

fn prop_name_text(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(ident) => Some(ident.sym.to_string()),
        PropName::Str(s) => Some(s.value.to_string()),
        PropName::Num(n) => Some(n.value.to_string()),
        PropName::BigInt(b) => Some(b.value.to_string()),
        PropName::Computed(_) => None,
    }
}

// -----------------------------------------------------------------------------
// Selective text patcher
// -----------------------------------------------------------------------------

/// Regenerated text for one statement plus the byte range it replaces in the
/// original source.
struct Rewrite {
    range: Range<usize>,
    text: String,
}

/// Splice rewrites into the original text, processing them in descending
/// start order so earlier offsets stay valid. The given ranges must be
/// mutually exclusive; overlap or out-of-range offsets fail the whole patch,
/// never producing partial output.
fn patch_source(source: &str, mut rewrites: Vec<Rewrite>) -> Result<String, InsertError> {
    rewrites.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    for pair in rewrites.windows(2) {
        if pair[1].range.end > pair[0].range.start {
            return Err(InsertError::OverlappingSpans);
        }
    }

    let mut out = source.to_string();
    for rewrite in rewrites {
        let Range { start, end } = rewrite.range;
        if end > out.len() || !out.is_char_boundary(start) || !out.is_char_boundary(end) {
            return Err(InsertError::MissingSpan);
        }
        out.replace_range(start..end, &rewrite.text);
    }
    Ok(out)
}

// -----------------------------------------------------------------------------
// Entry point
// -----------------------------------------------------------------------------

/// Insert a property into a file's `propTypes` and `defaultProps`
/// declarations and return the new full file text.
///
/// Only the bytes of the rewritten assignment statements change; everything
/// outside their original spans is byte-identical in the result. Both
/// declarations must be present, each assigning an object literal. Any
/// failure returns an [`InsertError`] and produces no partial output for the
/// caller to apply.
pub fn insert_property(
    source: &str,
    descriptor: &PropertyDescriptor,
) -> Result<String, InsertError> {
    let mut parsed = parse_source(source)?;

    let mut inserter = PropertyInserter::new(descriptor);
    parsed.module.visit_mut_with(&mut inserter);

    if let Some(err) = inserter.error.take() {
        return Err(err);
    }
    let prop_types = inserter
        .prop_types
        .ok_or(InsertError::DeclarationNotFound(DeclarationKind::PropTypes))?;
    if !inserter.default_props_found {
        return Err(InsertError::DeclarationNotFound(
            DeclarationKind::DefaultProps,
        ));
    }

    let mut rewrites = vec![parsed.rewrite_for(prop_types)?];
    if let Some(default_props) = inserter.default_props {
        rewrites.push(parsed.rewrite_for(default_props)?);
    }
    patch_source(source, rewrites)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
