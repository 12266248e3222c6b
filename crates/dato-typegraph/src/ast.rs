//! Declaration-level AST for TypeScript `.d.ts` files.
//!
//! The parser keeps the original source text of every declaration for
//! emission and builds a structured tree only where the extractors need to
//! look inside: type expressions (for reference collection and printing) and
//! class bodies (for signature extraction).

use std::fmt;

/// A parsed type expression.
#[derive(Debug, Clone, PartialEq)]
pub enum TsType {
    /// A reference to a named type, possibly qualified and with type
    /// arguments: `ApiTypes.Item`, `Promise<T>`.
    Named {
        /// Qualified name parts, e.g. `["ApiTypes", "Item"]`.
        parts: Vec<String>,
        /// Type arguments, empty when none.
        args: Vec<TsType>,
    },
    /// `A | B | C`
    Union(Vec<TsType>),
    /// `A & B`
    Intersection(Vec<TsType>),
    /// `T[]`
    Array(Box<TsType>),
    /// `[A, B]`
    Tuple(Vec<TsType>),
    /// `{ name: T; … }`
    Object(Vec<ObjectMember>),
    /// `(a: T) => U`
    Function {
        /// Parameter list.
        params: Vec<Param>,
        /// Return type.
        return_type: Box<TsType>,
    },
    /// `"literal"`
    StringLiteral(String),
    /// `42`, `-1`
    NumberLiteral(String),
    /// Built-in keyword type: `string`, `number`, `void`, `any`, …
    Keyword(String),
    /// `typeof x.y`
    TypeOf(Vec<String>),
    /// `T[K]`
    IndexedAccess {
        /// The object type.
        object: Box<TsType>,
        /// The index type.
        index: Box<TsType>,
    },
    /// `keyof T`, `readonly T[]`, `infer U`
    Operator {
        /// The operator keyword.
        op: String,
        /// The operand.
        operand: Box<TsType>,
    },
    /// `A extends B ? C : D`
    Conditional {
        /// The checked type.
        check: Box<TsType>,
        /// The `extends` constraint.
        extends_type: Box<TsType>,
        /// Type when the check holds.
        true_type: Box<TsType>,
        /// Type when the check fails.
        false_type: Box<TsType>,
    },
    /// `(T)`
    Parenthesized(Box<TsType>),
    /// `import("./mod.js").Item`
    ImportType {
        /// Module specifier inside `import(...)`.
        specifier: String,
        /// Qualified parts following the import call.
        parts: Vec<String>,
        /// Type arguments.
        args: Vec<TsType>,
    },
    /// Source text of a construct the parser does not model structurally
    /// (mapped types, template literal types).
    Raw(String),
}

/// A member of an object type or interface body.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMember {
    /// `name?: T`
    Property {
        /// Property name.
        name: String,
        /// Whether the property is optional.
        optional: bool,
        /// Property type; `None` when the annotation is missing.
        ty: Option<TsType>,
    },
    /// `name(...): T`
    Method {
        /// Method name.
        name: String,
        /// Call signature.
        signature: CallSignature,
    },
    /// `[key: string]: T`
    Index {
        /// Key type.
        key: TsType,
        /// Value type.
        value: TsType,
    },
    /// `(...): T` or `new (...): T`
    Call(CallSignature),
}

/// A function or method parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Marked with `?`.
    pub optional: bool,
    /// Rest parameter (`...args`).
    pub rest: bool,
    /// Declared type, if annotated.
    pub ty: Option<TsType>,
}

/// A call signature: parameters plus return type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallSignature {
    /// Parameters in declaration order.
    pub params: Vec<Param>,
    /// Return type, if annotated.
    pub return_type: Option<TsType>,
}

/// A named reference found inside a declaration, to be resolved against the
/// module graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Qualified name parts as written in the source.
    pub parts: Vec<String>,
    /// Module specifier when the reference came from `import("…")`.
    pub import_specifier: Option<String>,
}

impl TypeRef {
    /// Builds a plain (non-import) reference.
    #[must_use]
    pub fn new(parts: Vec<String>) -> Self {
        Self {
            parts,
            import_specifier: None,
        }
    }

    /// The reference as written, e.g. `ApiTypes.Item`.
    #[must_use]
    pub fn written(&self) -> String {
        self.parts.join(".")
    }
}

/// Keyword types recognized by the parser. References to these are never
/// collected as named refs.
pub const KEYWORD_TYPES: &[&str] = &[
    "string",
    "number",
    "boolean",
    "bigint",
    "symbol",
    "object",
    "any",
    "unknown",
    "never",
    "void",
    "null",
    "undefined",
    "this",
    "true",
    "false",
];

/// Declaration kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// `interface X { … }`
    Interface,
    /// `type X = …`
    TypeAlias,
    /// `class X { … }`
    Class,
    /// `enum X { … }`
    Enum,
    /// `function x(…): …`
    Function,
    /// `const x: …`
    Var,
    /// `namespace X { … }`
    Namespace,
}

/// One top-level (or namespace-nested) declaration.
///
/// Nested namespace members are flattened into the module's declaration
/// list under dotted names (`Ns.Inner`), with the namespace itself present
/// as a [`DeclKind::Namespace`] entry listing its member names.
#[derive(Debug, Clone)]
pub struct Decl {
    /// Declaration name; dotted for namespace members.
    pub name: String,
    /// Declaration kind.
    pub kind: DeclKind,
    /// Exact source text of the declaration (leading comments excluded).
    pub text: String,
    /// Leading JSDoc, cleaned of comment markers.
    pub doc: Option<String>,
    /// Whether the declaration is exported from its module (members of
    /// ambient namespaces always are).
    pub exported: bool,
    /// Named type references appearing in the declaration, type
    /// parameters already filtered out.
    pub refs: Vec<TypeRef>,
    /// Class structure, present when `kind == Class`.
    pub class: Option<ClassDetails>,
    /// Member names, present when `kind == Namespace`.
    pub namespace_members: Vec<String>,
}

/// Structured view of a class body.
#[derive(Debug, Clone, Default)]
pub struct ClassDetails {
    /// `extends` heritage references.
    pub extends: Vec<TypeRef>,
    /// Instance properties.
    pub properties: Vec<ClassProperty>,
    /// Methods, one entry per overload in source order.
    pub methods: Vec<ClassMethod>,
}

/// A class instance property.
#[derive(Debug, Clone)]
pub struct ClassProperty {
    /// Property name.
    pub name: String,
    /// Declared type.
    pub ty: Option<TsType>,
    /// Leading JSDoc.
    pub doc: Option<String>,
}

/// One method overload in a class body.
#[derive(Debug, Clone)]
pub struct ClassMethod {
    /// Method name.
    pub name: String,
    /// The overload's signature.
    pub signature: CallSignature,
    /// Leading JSDoc.
    pub doc: Option<String>,
}

fn needs_parens(ty: &TsType) -> bool {
    matches!(
        ty,
        TsType::Union(_) | TsType::Intersection(_) | TsType::Function { .. } | TsType::Conditional { .. }
    )
}

fn join(types: &[TsType], sep: &str) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for TsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { parts, args } => {
                write!(f, "{}", parts.join("."))?;
                if !args.is_empty() {
                    write!(f, "<{}>", join(args, ", "))?;
                }
                Ok(())
            }
            Self::Union(types) => write!(f, "{}", join(types, " | ")),
            Self::Intersection(types) => write!(f, "{}", join(types, " & ")),
            Self::Array(inner) => {
                if needs_parens(inner) {
                    write!(f, "({inner})[]")
                } else {
                    write!(f, "{inner}[]")
                }
            }
            Self::Tuple(types) => write!(f, "[{}]", join(types, ", ")),
            Self::Object(members) => {
                if members.is_empty() {
                    return write!(f, "{{}}");
                }
                let rendered: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "{{ {} }}", rendered.join(" "))
            }
            Self::Function {
                params,
                return_type,
            } => {
                let rendered: Vec<String> = params.iter().map(ToString::to_string).collect();
                write!(f, "({}) => {return_type}", rendered.join(", "))
            }
            Self::StringLiteral(value) => write!(f, "\"{value}\""),
            Self::NumberLiteral(value) | Self::Keyword(value) | Self::Raw(value) => {
                write!(f, "{value}")
            }
            Self::TypeOf(parts) => write!(f, "typeof {}", parts.join(".")),
            Self::IndexedAccess { object, index } => write!(f, "{object}[{index}]"),
            Self::Operator { op, operand } => write!(f, "{op} {operand}"),
            Self::Conditional {
                check,
                extends_type,
                true_type,
                false_type,
            } => write!(f, "{check} extends {extends_type} ? {true_type} : {false_type}"),
            Self::Parenthesized(inner) => write!(f, "({inner})"),
            Self::ImportType {
                specifier,
                parts,
                args,
            } => {
                write!(f, "import(\"{specifier}\")")?;
                if !parts.is_empty() {
                    write!(f, ".{}", parts.join("."))?;
                }
                if !args.is_empty() {
                    write!(f, "<{}>", join(args, ", "))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for ObjectMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property { name, optional, ty } => {
                let marker = if *optional { "?" } else { "" };
                match ty {
                    Some(ty) => write!(f, "{name}{marker}: {ty};"),
                    None => write!(f, "{name}{marker};"),
                }
            }
            Self::Method { name, signature } => write!(f, "{name}{signature};"),
            Self::Index { key, value } => write!(f, "[key: {key}]: {value};"),
            Self::Call(signature) => write!(f, "{signature};"),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rest {
            write!(f, "...")?;
        }
        write!(f, "{}", self.name)?;
        if self.optional {
            write!(f, "?")?;
        }
        if let Some(ty) = &self.ty {
            write!(f, ": {ty}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "({})", rendered.join(", "))?;
        if let Some(ret) = &self.return_type {
            write!(f, ": {ret}")?;
        }
        Ok(())
    }
}
