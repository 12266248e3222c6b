//! Declaration parser for `.d.ts` modules.
//!
//! Recursive descent over the token stream from [`crate::lexer`]. The parser
//! is deliberately lenient: constructs it does not model structurally
//! (mapped types, template literal types) are kept as raw source text, and
//! stray tokens are skipped, so one exotic declaration never sinks a whole
//! module.

use crate::ast::{
    CallSignature, ClassDetails, ClassMethod, ClassProperty, Decl, DeclKind, ObjectMember, Param,
    TsType, TypeRef, KEYWORD_TYPES,
};
use crate::lexer::{lex, Token, TokenKind};
use std::collections::{HashMap, HashSet};

/// Where an imported local binding points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// `import { imported as local } from specifier`
    Named {
        /// Module specifier.
        specifier: String,
        /// Name exported by the target module (`default` for default
        /// imports).
        imported: String,
    },
    /// `import * as local from specifier`
    Namespace {
        /// Module specifier.
        specifier: String,
    },
}

/// What an exported name points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    /// A local declaration or import binding.
    Named(String),
    /// `export { imported as name } from specifier`
    Reexport {
        /// Module specifier.
        specifier: String,
        /// Name in the target module.
        imported: String,
    },
    /// `export * as name from specifier`
    NamespaceReexport {
        /// Module specifier.
        specifier: String,
    },
}

/// Parse result for one module file.
#[derive(Debug, Default)]
pub struct ParsedModule {
    /// Declarations, namespace members flattened under dotted names.
    pub decls: Vec<Decl>,
    /// Local import bindings.
    pub imports: HashMap<String, ImportTarget>,
    /// Export table.
    pub exports: HashMap<String, Export>,
    /// `export * from …` specifiers, in source order.
    pub star_exports: Vec<String>,
    /// `export = name`, when present.
    pub export_equals: Option<String>,
    /// Every module specifier mentioned by imports/re-exports.
    pub specifiers: Vec<String>,
}

/// Parses one `.d.ts` source file.
#[must_use]
pub fn parse_module(source: &str) -> ParsedModule {
    Parser::new(source).run()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    module: ParsedModule,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: lex(source),
            pos: 0,
            module: ParsedModule::default(),
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, text: &str) -> bool {
        let t = self.peek();
        t.kind == TokenKind::Punct && t.text == text
    }

    fn is_ident(&self, text: &str) -> bool {
        let t = self.peek();
        t.kind == TokenKind::Ident && t.text == text
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        if self.is_punct(text) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, text: &str) -> bool {
        if self.is_ident(text) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skips a balanced `{ … }` / `( … )` / `[ … ]` / `< … >` group whose
    /// opener is the current token. Returns the index one past the closer.
    fn skip_balanced(&mut self, open: &str, close: &str) {
        let mut depth = 0usize;
        while !self.at_eof() {
            if self.is_punct(open) {
                depth += 1;
            } else if self.is_punct(close) {
                if depth <= 1 {
                    self.bump();
                    return;
                }
                depth -= 1;
            }
            self.bump();
        }
    }

    fn text_between(&self, start_token: usize, end_token: usize) -> String {
        let start = self.tokens[start_token].start;
        let end = self.tokens[end_token.min(self.tokens.len() - 1)].end;
        self.source[start..end.min(self.source.len())].to_string()
    }

    // ------------------------------------------------------------------
    // Module items
    // ------------------------------------------------------------------

    fn run(mut self) -> ParsedModule {
        while !self.at_eof() {
            self.parse_item();
        }
        self.module
    }

    fn parse_item(&mut self) {
        if self.is_punct(";") {
            self.bump();
            return;
        }
        if self.is_ident("import") {
            self.parse_import();
            return;
        }
        if self.is_ident("export") {
            self.parse_export();
            return;
        }
        if self.peek().kind == TokenKind::Ident && self.starts_declaration() {
            let start = self.pos;
            let doc = self.peek().doc.clone();
            if let Some(decl) = self.parse_declaration(false, String::new(), start, doc) {
                self.module.decls.push(decl);
            }
            return;
        }
        // Stray token: skip it.
        self.bump();
    }

    fn starts_declaration(&self) -> bool {
        let mut offset = 0;
        // Look past modifiers.
        while matches!(
            self.peek_at(offset).text.as_str(),
            "declare" | "abstract" | "async"
        ) && self.peek_at(offset).kind == TokenKind::Ident
        {
            offset += 1;
        }
        matches!(
            self.peek_at(offset).text.as_str(),
            "interface" | "type" | "class" | "enum" | "function" | "const" | "let" | "var"
                | "namespace" | "module" | "global"
        )
    }

    fn parse_import(&mut self) {
        self.bump(); // import
        self.eat_ident("type");

        // Bare side-effect import: `import 'x';`
        if self.peek().kind == TokenKind::Str {
            let spec = self.bump().text;
            self.module.specifiers.push(spec);
            self.eat_punct(";");
            return;
        }

        // `import A = require('x');`
        if self.peek().kind == TokenKind::Ident && self.peek_at(1).text == "=" {
            let local = self.bump().text;
            self.bump(); // =
            self.eat_ident("require");
            self.eat_punct("(");
            if self.peek().kind == TokenKind::Str {
                let spec = self.bump().text;
                self.module.specifiers.push(spec.clone());
                self.module
                    .imports
                    .insert(local, ImportTarget::Namespace { specifier: spec });
            }
            self.eat_punct(")");
            self.eat_punct(";");
            return;
        }

        let mut default_binding: Option<String> = None;
        let mut namespace_binding: Option<String> = None;
        let mut named: Vec<(String, String)> = Vec::new(); // (imported, local)

        if self.peek().kind == TokenKind::Ident && !self.is_ident("from") {
            default_binding = Some(self.bump().text);
            self.eat_punct(",");
        }
        if self.eat_punct("*") {
            self.eat_ident("as");
            if self.peek().kind == TokenKind::Ident {
                namespace_binding = Some(self.bump().text);
            }
        } else if self.eat_punct("{") {
            while !self.is_punct("}") && !self.at_eof() {
                self.eat_ident("type");
                if self.peek().kind != TokenKind::Ident {
                    self.bump();
                    continue;
                }
                let imported = self.bump().text;
                let local = if self.eat_ident("as") {
                    self.bump().text
                } else {
                    imported.clone()
                };
                named.push((imported, local));
                self.eat_punct(",");
            }
            self.eat_punct("}");
        }

        self.eat_ident("from");
        if self.peek().kind == TokenKind::Str {
            let spec = self.bump().text;
            self.module.specifiers.push(spec.clone());
            if let Some(local) = default_binding {
                self.module.imports.insert(
                    local,
                    ImportTarget::Named {
                        specifier: spec.clone(),
                        imported: "default".to_string(),
                    },
                );
            }
            if let Some(local) = namespace_binding {
                self.module.imports.insert(
                    local,
                    ImportTarget::Namespace {
                        specifier: spec.clone(),
                    },
                );
            }
            for (imported, local) in named {
                self.module.imports.insert(
                    local,
                    ImportTarget::Named {
                        specifier: spec.clone(),
                        imported,
                    },
                );
            }
        }
        self.eat_punct(";");
    }

    fn parse_export(&mut self) {
        let export_start = self.pos;
        let export_doc = self.peek().doc.clone();
        self.bump(); // export

        // `export * from 'x'` / `export * as NS from 'x'`
        if self.eat_punct("*") {
            let alias = if self.eat_ident("as") {
                Some(self.bump().text)
            } else {
                None
            };
            self.eat_ident("from");
            if self.peek().kind == TokenKind::Str {
                let spec = self.bump().text;
                self.module.specifiers.push(spec.clone());
                match alias {
                    Some(name) => {
                        self.module
                            .exports
                            .insert(name, Export::NamespaceReexport { specifier: spec });
                    }
                    None => self.module.star_exports.push(spec),
                }
            }
            self.eat_punct(";");
            return;
        }

        // `export { A, B as C } [from 'x']`
        if self.is_punct("{") || (self.is_ident("type") && self.peek_at(1).text == "{") {
            self.eat_ident("type");
            self.bump(); // {
            let mut entries: Vec<(String, String)> = Vec::new(); // (local/imported, exported)
            while !self.is_punct("}") && !self.at_eof() {
                self.eat_ident("type");
                if self.peek().kind != TokenKind::Ident {
                    self.bump();
                    continue;
                }
                let source_name = self.bump().text;
                let exported = if self.eat_ident("as") {
                    self.bump().text
                } else {
                    source_name.clone()
                };
                entries.push((source_name, exported));
                self.eat_punct(",");
            }
            self.eat_punct("}");

            if self.eat_ident("from") && self.peek().kind == TokenKind::Str {
                let spec = self.bump().text;
                self.module.specifiers.push(spec.clone());
                for (imported, exported) in entries {
                    self.module.exports.insert(
                        exported,
                        Export::Reexport {
                            specifier: spec.clone(),
                            imported,
                        },
                    );
                }
            } else {
                for (local, exported) in entries {
                    self.module.exports.insert(exported, Export::Named(local));
                }
            }
            self.eat_punct(";");
            return;
        }

        // `export = X;`
        if self.eat_punct("=") {
            if self.peek().kind == TokenKind::Ident {
                self.module.export_equals = Some(self.bump().text);
            }
            self.eat_punct(";");
            return;
        }

        // `export default …`
        if self.is_ident("default") {
            self.bump();
            if self.peek().kind == TokenKind::Ident && self.peek_at(1).text == ";" {
                let local = self.bump().text;
                self.module
                    .exports
                    .insert("default".to_string(), Export::Named(local));
                self.eat_punct(";");
            } else if let Some(decl) =
                self.parse_declaration(false, String::new(), export_start, export_doc)
            {
                self.module
                    .exports
                    .insert("default".to_string(), Export::Named(decl.name.clone()));
                self.module.decls.push(decl);
            }
            return;
        }

        // `export <declaration>`
        if let Some(decl) = self.parse_declaration(true, String::new(), export_start, export_doc) {
            self.module
                .exports
                .insert(decl.name.clone(), Export::Named(decl.name.clone()));
            self.module.decls.push(decl);
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Parses one declaration. `prefix` carries the dotted namespace path
    /// for nested members; `start_token`/`doc` come from the caller so that
    /// an already-consumed `export` keyword stays inside the source span.
    fn parse_declaration(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        while matches!(self.peek().text.as_str(), "declare" | "abstract" | "async")
            && self.peek().kind == TokenKind::Ident
        {
            self.bump();
        }

        let keyword = self.peek().text.clone();
        match keyword.as_str() {
            "interface" => self.parse_interface(exported, prefix, start_token, doc),
            "type" => self.parse_type_alias(exported, prefix, start_token, doc),
            "class" => self.parse_class(exported, prefix, start_token, doc),
            "enum" => self.parse_enum(exported, prefix, start_token, doc),
            "const" if self.peek_at(1).text == "enum" => {
                self.bump();
                self.parse_enum(exported, prefix, start_token, doc)
            }
            "function" => self.parse_function(exported, prefix, start_token, doc),
            "const" | "let" | "var" => self.parse_var(exported, prefix, start_token, doc),
            "namespace" | "module" => self.parse_namespace(exported, prefix, start_token, doc),
            "global" => {
                // `declare global { ... }` is irrelevant to the client graph.
                self.bump();
                if self.is_punct("{") {
                    self.skip_balanced("{", "}");
                }
                None
            }
            _ => {
                self.bump();
                None
            }
        }
    }

    fn parse_interface(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        self.bump(); // interface
        let name = self.expect_name()?;
        let type_params = self.parse_type_params();

        let mut refs = Vec::new();
        if self.eat_ident("extends") {
            loop {
                let heritage = self.parse_type();
                collect_refs(&heritage, &mut refs);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }

        if self.is_punct("{") {
            self.bump();
            let members = self.parse_object_members();
            for member in &members {
                collect_member_refs(member, &mut refs);
            }
        }
        let end_token = self.pos.saturating_sub(1);

        Some(self.finish_decl(
            exported,
            prefix,
            name,
            DeclKind::Interface,
            start_token,
            end_token,
            doc,
            refs,
            &type_params,
            None,
            Vec::new(),
        ))
    }

    fn parse_type_alias(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        self.bump(); // type
        let name = self.expect_name()?;
        let type_params = self.parse_type_params();
        let mut refs = Vec::new();
        if self.eat_punct("=") {
            let ty = self.parse_type();
            collect_refs(&ty, &mut refs);
        }
        self.eat_punct(";");
        let end_token = self.pos.saturating_sub(1);

        Some(self.finish_decl(
            exported,
            prefix,
            name,
            DeclKind::TypeAlias,
            start_token,
            end_token,
            doc,
            refs,
            &type_params,
            None,
            Vec::new(),
        ))
    }

    fn parse_class(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        self.bump(); // class
        let name = self.expect_name()?;
        let type_params = self.parse_type_params();

        let mut details = ClassDetails::default();
        let mut refs = Vec::new();

        if self.eat_ident("extends") {
            let heritage = self.parse_type();
            collect_refs(&heritage, &mut refs);
            if let TsType::Named { parts, .. } = &heritage {
                details.extends.push(TypeRef::new(parts.clone()));
            }
        }
        if self.eat_ident("implements") {
            loop {
                let heritage = self.parse_type();
                collect_refs(&heritage, &mut refs);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }

        if self.is_punct("{") {
            self.bump();
            self.parse_class_body(&mut details, &mut refs);
        }
        let end_token = self.pos.saturating_sub(1);

        Some(self.finish_decl(
            exported,
            prefix,
            name,
            DeclKind::Class,
            start_token,
            end_token,
            doc,
            refs,
            &type_params,
            Some(details),
            Vec::new(),
        ))
    }

    fn parse_class_body(&mut self, details: &mut ClassDetails, refs: &mut Vec<TypeRef>) {
        while !self.is_punct("}") && !self.at_eof() {
            if self.eat_punct(";") {
                continue;
            }
            let member_start = self.pos;
            let member_doc = self.peek().doc.clone();

            while matches!(
                self.peek().text.as_str(),
                "public" | "private" | "protected" | "static" | "readonly" | "abstract"
                    | "declare" | "override" | "async"
            ) && self.peek().kind == TokenKind::Ident
                // `static` / `readonly` can also *be* the member name.
                && !matches!(self.peek_at(1).text.as_str(), "(" | ":" | ";" | "?" | "=" | "}")
            {
                self.bump();
            }

            // Accessors: treat `get name(): T` / `set name(v: T)` as methods.
            if (self.is_ident("get") || self.is_ident("set"))
                && self.peek_at(1).kind == TokenKind::Ident
            {
                self.bump();
            }

            if self.is_ident("constructor") {
                self.bump();
                if self.is_punct("(") {
                    let signature = self.parse_call_signature();
                    for param in &signature.params {
                        if let Some(ty) = &param.ty {
                            collect_refs(ty, refs);
                        }
                    }
                }
                self.eat_punct(";");
                continue;
            }

            if self.is_punct("[") {
                // Index signature or computed name; neither matters for
                // signature extraction, but its types still count as refs.
                self.skip_balanced("[", "]");
                if self.eat_punct(":") {
                    let ty = self.parse_type();
                    collect_refs(&ty, refs);
                }
                self.eat_punct(";");
                continue;
            }

            if self.peek().kind != TokenKind::Ident && self.peek().kind != TokenKind::Str {
                self.bump();
                continue;
            }

            let name = self.bump().text;
            self.eat_punct("?");

            if self.is_punct("<") {
                // Method-level generics: parse and discard the binder list.
                self.parse_type_params();
            }

            if self.is_punct("(") {
                let signature = self.parse_call_signature();
                for param in &signature.params {
                    if let Some(ty) = &param.ty {
                        collect_refs(ty, refs);
                    }
                }
                if let Some(ret) = &signature.return_type {
                    collect_refs(ret, refs);
                }
                details.methods.push(ClassMethod {
                    name,
                    signature,
                    doc: self.tokens[member_start].doc.clone().or(member_doc),
                });
                self.eat_punct(";");
            } else if self.eat_punct(":") {
                let ty = self.parse_type();
                collect_refs(&ty, refs);
                details.properties.push(ClassProperty {
                    name,
                    ty: Some(ty),
                    doc: self.tokens[member_start].doc.clone().or(member_doc),
                });
                if self.eat_punct("=") {
                    self.skip_initializer();
                }
                self.eat_punct(";");
            } else if self.eat_punct("=") {
                self.skip_initializer();
                self.eat_punct(";");
            } else {
                self.eat_punct(";");
            }
        }
        self.eat_punct("}");
    }

    fn skip_initializer(&mut self) {
        while !self.is_punct(";") && !self.is_punct("}") && !self.at_eof() {
            if self.is_punct("{") {
                self.skip_balanced("{", "}");
            } else if self.is_punct("(") {
                self.skip_balanced("(", ")");
            } else if self.is_punct("[") {
                self.skip_balanced("[", "]");
            } else {
                self.bump();
            }
        }
    }

    fn parse_enum(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        self.bump(); // enum
        let name = self.expect_name()?;
        if self.is_punct("{") {
            self.skip_balanced("{", "}");
        }
        let end_token = self.pos.saturating_sub(1);
        Some(self.finish_decl(
            exported,
            prefix,
            name,
            DeclKind::Enum,
            start_token,
            end_token,
            doc,
            Vec::new(),
            &[],
            None,
            Vec::new(),
        ))
    }

    fn parse_function(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        self.bump(); // function
        let name = self.expect_name()?;
        let type_params = self.parse_type_params();
        let mut refs = Vec::new();
        if self.is_punct("(") {
            let signature = self.parse_call_signature();
            for param in &signature.params {
                if let Some(ty) = &param.ty {
                    collect_refs(ty, &mut refs);
                }
            }
            if let Some(ret) = &signature.return_type {
                collect_refs(ret, &mut refs);
            }
        }
        self.eat_punct(";");
        let end_token = self.pos.saturating_sub(1);
        Some(self.finish_decl(
            exported,
            prefix,
            name,
            DeclKind::Function,
            start_token,
            end_token,
            doc,
            refs,
            &type_params,
            None,
            Vec::new(),
        ))
    }

    fn parse_var(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        self.bump(); // const | let | var
        let name = self.expect_name()?;
        let mut refs = Vec::new();
        if self.eat_punct(":") {
            let ty = self.parse_type();
            collect_refs(&ty, &mut refs);
        }
        if self.eat_punct("=") {
            self.skip_initializer();
        }
        self.eat_punct(";");
        let end_token = self.pos.saturating_sub(1);
        Some(self.finish_decl(
            exported,
            prefix,
            name,
            DeclKind::Var,
            start_token,
            end_token,
            doc,
            refs,
            &[],
            None,
            Vec::new(),
        ))
    }

    fn parse_namespace(
        &mut self,
        exported: bool,
        prefix: String,
        start_token: usize,
        doc: Option<String>,
    ) -> Option<Decl> {
        self.bump(); // namespace | module

        // `declare module 'specifier' { … }` is an ambient module, not a
        // namespace; skip it wholesale.
        if self.peek().kind == TokenKind::Str {
            self.bump();
            if self.is_punct("{") {
                self.skip_balanced("{", "}");
            }
            return None;
        }

        let name = self.expect_name()?;
        let full_name = qualified(&prefix, &name);
        let mut members = Vec::new();
        let mut member_refs = Vec::new();

        if self.eat_punct("{") {
            while !self.is_punct("}") && !self.at_eof() {
                if self.eat_punct(";") {
                    continue;
                }
                // Namespace members are implicitly exported in ambient
                // declarations; an explicit `export` keyword is consumed.
                let member_start = self.pos;
                let member_doc = self.peek().doc.clone();
                self.eat_ident("export");
                if let Some(nested) =
                    self.parse_declaration(true, full_name.clone(), member_start, member_doc)
                {
                    members.push(nested.name.clone());
                    member_refs.extend(nested.refs.iter().cloned());
                    self.module.decls.push(nested);
                } else if !self.is_punct("}") && !self.at_eof() {
                    self.bump();
                }
            }
            self.eat_punct("}");
        }
        let end_token = self.pos.saturating_sub(1);

        Some(self.finish_decl(
            exported,
            prefix,
            name,
            DeclKind::Namespace,
            start_token,
            end_token,
            doc,
            member_refs,
            &[],
            None,
            members,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_decl(
        &self,
        exported: bool,
        prefix: String,
        name: String,
        kind: DeclKind,
        start_token: usize,
        end_token: usize,
        doc: Option<String>,
        refs: Vec<TypeRef>,
        type_params: &[String],
        class: Option<ClassDetails>,
        namespace_members: Vec<String>,
    ) -> Decl {
        let param_set: HashSet<&str> = type_params.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let refs: Vec<TypeRef> = refs
            .into_iter()
            .filter(|r| !r.parts.is_empty() && !param_set.contains(r.parts[0].as_str()))
            .filter(|r| seen.insert((r.written(), r.import_specifier.clone())))
            .collect();

        Decl {
            name: qualified(&prefix, &name),
            kind,
            text: self.text_between(start_token, end_token),
            doc,
            exported: exported || !prefix.is_empty(),
            refs,
            class,
            namespace_members,
        }
    }

    fn expect_name(&mut self) -> Option<String> {
        if self.peek().kind == TokenKind::Ident {
            Some(self.bump().text)
        } else {
            None
        }
    }

    /// Parses `<T, U extends X = Y>`; returns binder names. Constraint and
    /// default types are parsed but discarded (their refs are collected by
    /// the caller through the returned binder filter).
    fn parse_type_params(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        if !self.eat_punct("<") {
            return names;
        }
        while !self.is_punct(">") && !self.at_eof() {
            self.eat_ident("const");
            if self.peek().kind == TokenKind::Ident {
                names.push(self.bump().text);
            } else {
                self.bump();
                continue;
            }
            if self.eat_ident("extends") {
                let _ = self.parse_type();
            }
            if self.eat_punct("=") {
                let _ = self.parse_type();
            }
            self.eat_punct(",");
        }
        self.eat_punct(">");
        names
    }

    // ------------------------------------------------------------------
    // Call signatures & parameters
    // ------------------------------------------------------------------

    fn parse_call_signature(&mut self) -> CallSignature {
        let mut signature = CallSignature::default();
        if !self.eat_punct("(") {
            return signature;
        }
        while !self.is_punct(")") && !self.at_eof() {
            signature.params.push(self.parse_param());
            self.eat_punct(",");
        }
        self.eat_punct(")");
        if self.eat_punct(":") {
            signature.return_type = Some(self.parse_type());
        }
        signature
    }

    fn parse_param(&mut self) -> Param {
        while matches!(self.peek().text.as_str(), "public" | "private" | "protected" | "readonly")
            && self.peek().kind == TokenKind::Ident
            && self.peek_at(1).kind == TokenKind::Ident
        {
            self.bump();
        }

        let rest = self.eat_punct("...");
        let name = if self.is_punct("{") {
            self.skip_balanced("{", "}");
            "destructured".to_string()
        } else if self.is_punct("[") {
            self.skip_balanced("[", "]");
            "destructured".to_string()
        } else if self.peek().kind == TokenKind::Ident {
            self.bump().text
        } else {
            self.bump().text
        };
        let optional = self.eat_punct("?");
        let ty = if self.eat_punct(":") {
            Some(self.parse_type())
        } else {
            None
        };
        if self.eat_punct("=") {
            // Defaults do not appear in .d.ts output, but tolerate them.
            self.skip_param_default();
        }
        Param {
            name,
            optional,
            rest,
            ty,
        }
    }

    fn skip_param_default(&mut self) {
        while !self.is_punct(",") && !self.is_punct(")") && !self.at_eof() {
            if self.is_punct("(") {
                self.skip_balanced("(", ")");
            } else if self.is_punct("{") {
                self.skip_balanced("{", "}");
            } else if self.is_punct("[") {
                self.skip_balanced("[", "]");
            } else {
                self.bump();
            }
        }
    }

    // ------------------------------------------------------------------
    // Object members (interfaces and object types)
    // ------------------------------------------------------------------

    fn parse_object_members(&mut self) -> Vec<ObjectMember> {
        let mut members = Vec::new();
        while !self.is_punct("}") && !self.at_eof() {
            if self.eat_punct(";") || self.eat_punct(",") {
                continue;
            }
            self.eat_ident("readonly");

            if self.is_punct("[") {
                // Index signature: `[key: string]: T`.
                self.bump();
                let _key_name = if self.peek().kind == TokenKind::Ident {
                    self.bump().text
                } else {
                    String::new()
                };
                let key = if self.eat_punct(":") {
                    self.parse_type()
                } else {
                    TsType::Keyword("string".to_string())
                };
                self.eat_punct("]");
                let value = if self.eat_punct(":") {
                    self.parse_type()
                } else {
                    TsType::Keyword("any".to_string())
                };
                members.push(ObjectMember::Index { key, value });
                continue;
            }

            if self.is_punct("(") || self.is_punct("<") {
                // Call signature.
                if self.is_punct("<") {
                    self.parse_type_params();
                }
                let signature = self.parse_call_signature();
                members.push(ObjectMember::Call(signature));
                continue;
            }
            if self.is_ident("new") && self.peek_at(1).text == "(" {
                self.bump();
                let signature = self.parse_call_signature();
                members.push(ObjectMember::Call(signature));
                continue;
            }

            if self.peek().kind != TokenKind::Ident
                && self.peek().kind != TokenKind::Str
                && self.peek().kind != TokenKind::Num
            {
                self.bump();
                continue;
            }

            let name = self.bump().text;
            let optional = self.eat_punct("?");

            if self.is_punct("<") {
                self.parse_type_params();
            }
            if self.is_punct("(") {
                let signature = self.parse_call_signature();
                members.push(ObjectMember::Method { name, signature });
            } else if self.eat_punct(":") {
                let ty = self.parse_type();
                members.push(ObjectMember::Property {
                    name,
                    optional,
                    ty: Some(ty),
                });
            } else {
                members.push(ObjectMember::Property {
                    name,
                    optional,
                    ty: None,
                });
            }
        }
        self.eat_punct("}");
        members
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn parse_type(&mut self) -> TsType {
        let ty = self.parse_union();
        if self.is_ident("extends") {
            self.bump();
            let extends_type = self.parse_union();
            if self.eat_punct("?") {
                let true_type = self.parse_type();
                self.eat_punct(":");
                let false_type = self.parse_type();
                return TsType::Conditional {
                    check: Box::new(ty),
                    extends_type: Box::new(extends_type),
                    true_type: Box::new(true_type),
                    false_type: Box::new(false_type),
                };
            }
            // `extends` without `?` only occurs in constraint positions the
            // caller owns; fold it away.
            return ty;
        }
        ty
    }

    fn parse_union(&mut self) -> TsType {
        self.eat_punct("|");
        let first = self.parse_intersection();
        if !self.is_punct("|") {
            return first;
        }
        let mut arms = vec![first];
        while self.eat_punct("|") {
            arms.push(self.parse_intersection());
        }
        TsType::Union(arms)
    }

    fn parse_intersection(&mut self) -> TsType {
        let first = self.parse_postfix();
        if !self.is_punct("&") {
            return first;
        }
        let mut arms = vec![first];
        while self.eat_punct("&") {
            arms.push(self.parse_postfix());
        }
        TsType::Intersection(arms)
    }

    fn parse_postfix(&mut self) -> TsType {
        let mut ty = self.parse_primary();
        loop {
            if self.is_punct("[") {
                self.bump();
                if self.eat_punct("]") {
                    ty = TsType::Array(Box::new(ty));
                } else {
                    let index = self.parse_type();
                    self.eat_punct("]");
                    ty = TsType::IndexedAccess {
                        object: Box::new(ty),
                        index: Box::new(index),
                    };
                }
            } else {
                return ty;
            }
        }
    }

    fn parse_primary(&mut self) -> TsType {
        let token = self.peek().clone();

        match token.kind {
            TokenKind::Str => {
                self.bump();
                TsType::StringLiteral(token.text)
            }
            TokenKind::Num => {
                self.bump();
                TsType::NumberLiteral(token.text)
            }
            TokenKind::Template => {
                self.bump();
                TsType::Raw(token.text)
            }
            TokenKind::Punct => match token.text.as_str() {
                "(" => self.parse_paren_or_function(),
                "{" => self.parse_object_or_mapped(),
                "[" => {
                    self.bump();
                    let mut items = Vec::new();
                    while !self.is_punct("]") && !self.at_eof() {
                        // Tuples allow labels: `[id: string, ...rest: T[]]`.
                        self.eat_punct("...");
                        if self.peek().kind == TokenKind::Ident
                            && (self.peek_at(1).text == ":"
                                || (self.peek_at(1).text == "?" && self.peek_at(2).text == ":"))
                        {
                            self.bump();
                            self.eat_punct("?");
                            self.bump(); // :
                        }
                        items.push(self.parse_type());
                        self.eat_punct(",");
                    }
                    self.eat_punct("]");
                    TsType::Tuple(items)
                }
                "-" => {
                    self.bump();
                    if self.peek().kind == TokenKind::Num {
                        let num = self.bump().text;
                        TsType::NumberLiteral(format!("-{num}"))
                    } else {
                        TsType::Raw("-".to_string())
                    }
                }
                "<" => {
                    // Generic function type: `<T>(x: T) => T`.
                    self.parse_type_params();
                    self.parse_paren_or_function()
                }
                _ => {
                    self.bump();
                    TsType::Raw(token.text)
                }
            },
            TokenKind::Ident => match token.text.as_str() {
                "new" => {
                    self.bump();
                    self.parse_paren_or_function()
                }
                "keyof" | "readonly" | "unique" | "infer" => {
                    self.bump();
                    TsType::Operator {
                        op: token.text,
                        operand: Box::new(self.parse_postfix()),
                    }
                }
                "typeof" => {
                    self.bump();
                    let mut parts = Vec::new();
                    if self.peek().kind == TokenKind::Ident {
                        parts.push(self.bump().text);
                        while self.is_punct(".") && self.peek_at(1).kind == TokenKind::Ident {
                            self.bump();
                            parts.push(self.bump().text);
                        }
                    }
                    TsType::TypeOf(parts)
                }
                "import" if self.peek_at(1).text == "(" => self.parse_import_type(),
                _ => self.parse_named_type(),
            },
            TokenKind::Eof => TsType::Raw(String::new()),
        }
    }

    fn parse_named_type(&mut self) -> TsType {
        let first = self.bump().text;
        if KEYWORD_TYPES.contains(&first.as_str()) && !self.is_punct(".") {
            return TsType::Keyword(first);
        }
        let mut parts = vec![first];
        while self.is_punct(".") && self.peek_at(1).kind == TokenKind::Ident {
            self.bump();
            parts.push(self.bump().text);
        }
        let args = self.parse_type_args();
        TsType::Named { parts, args }
    }

    fn parse_type_args(&mut self) -> Vec<TsType> {
        let mut args = Vec::new();
        if !self.is_punct("<") {
            return args;
        }
        self.bump();
        while !self.is_punct(">") && !self.at_eof() {
            args.push(self.parse_type());
            if !self.eat_punct(",") {
                break;
            }
        }
        self.eat_punct(">");
        args
    }

    fn parse_import_type(&mut self) -> TsType {
        self.bump(); // import
        self.bump(); // (
        let specifier = if self.peek().kind == TokenKind::Str {
            self.bump().text
        } else {
            String::new()
        };
        self.eat_punct(")");
        let mut parts = Vec::new();
        while self.is_punct(".") && self.peek_at(1).kind == TokenKind::Ident {
            self.bump();
            parts.push(self.bump().text);
        }
        let args = self.parse_type_args();
        TsType::ImportType {
            specifier,
            parts,
            args,
        }
    }

    /// Disambiguates `(T)` from `(a: T, …) => U` by scanning for `=>` after
    /// the matching close paren.
    fn parse_paren_or_function(&mut self) -> TsType {
        let mut depth = 0usize;
        let mut idx = self.pos;
        loop {
            let t = &self.tokens[idx.min(self.tokens.len() - 1)];
            if t.kind == TokenKind::Eof {
                break;
            }
            if t.kind == TokenKind::Punct {
                match t.text.as_str() {
                    "(" => depth += 1,
                    ")" => {
                        depth -= 1;
                        if depth == 0 {
                            idx += 1;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            idx += 1;
        }
        let is_function = self.tokens.get(idx).is_some_and(|t| t.text == "=>");

        if is_function {
            let signature = self.parse_call_signature_arrow();
            TsType::Function {
                params: signature.params,
                return_type: Box::new(
                    signature
                        .return_type
                        .unwrap_or_else(|| TsType::Keyword("void".to_string())),
                ),
            }
        } else {
            self.bump(); // (
            let inner = self.parse_type();
            self.eat_punct(")");
            TsType::Parenthesized(Box::new(inner))
        }
    }

    fn parse_call_signature_arrow(&mut self) -> CallSignature {
        let mut signature = CallSignature::default();
        self.eat_punct("(");
        while !self.is_punct(")") && !self.at_eof() {
            signature.params.push(self.parse_param());
            self.eat_punct(",");
        }
        self.eat_punct(")");
        if self.eat_punct("=>") {
            signature.return_type = Some(self.parse_type());
        }
        signature
    }

    /// Parses `{ … }` as an object type, falling back to raw text for
    /// mapped types (`{ [K in keyof T]: U }`).
    fn parse_object_or_mapped(&mut self) -> TsType {
        // Mapped-type lookahead: `{` (`readonly` | `+` | `-`)? `[` Ident `in`.
        let mut offset = 1;
        while matches!(self.peek_at(offset).text.as_str(), "readonly" | "+" | "-") {
            offset += 1;
        }
        let is_mapped = self.peek_at(offset).text == "["
            && self.peek_at(offset + 1).kind == TokenKind::Ident
            && self.peek_at(offset + 2).text == "in";

        if is_mapped {
            let start_token = self.pos;
            self.skip_balanced("{", "}");
            let end_token = self.pos.saturating_sub(1);
            return TsType::Raw(self.text_between(start_token, end_token));
        }

        self.bump(); // {
        TsType::Object(self.parse_object_members())
    }
}

fn qualified(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Collects named type references from a type expression.
pub fn collect_refs(ty: &TsType, out: &mut Vec<TypeRef>) {
    match ty {
        TsType::Named { parts, args } => {
            if !(parts.len() == 1 && KEYWORD_TYPES.contains(&parts[0].as_str())) {
                out.push(TypeRef::new(parts.clone()));
            }
            for arg in args {
                collect_refs(arg, out);
            }
        }
        TsType::ImportType {
            specifier,
            parts,
            args,
        } => {
            if !parts.is_empty() {
                out.push(TypeRef {
                    parts: parts.clone(),
                    import_specifier: Some(specifier.clone()),
                });
            }
            for arg in args {
                collect_refs(arg, out);
            }
        }
        TsType::TypeOf(parts) => {
            if !parts.is_empty() {
                out.push(TypeRef::new(parts.clone()));
            }
        }
        TsType::Union(items) | TsType::Intersection(items) | TsType::Tuple(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        TsType::Array(inner) | TsType::Parenthesized(inner) => collect_refs(inner, out),
        TsType::Operator { operand, .. } => collect_refs(operand, out),
        TsType::Object(members) => {
            for member in members {
                collect_member_refs(member, out);
            }
        }
        TsType::Function {
            params,
            return_type,
        } => {
            for param in params {
                if let Some(ty) = &param.ty {
                    collect_refs(ty, out);
                }
            }
            collect_refs(return_type, out);
        }
        TsType::IndexedAccess { object, index } => {
            collect_refs(object, out);
            collect_refs(index, out);
        }
        TsType::Conditional {
            check,
            extends_type,
            true_type,
            false_type,
        } => {
            collect_refs(check, out);
            collect_refs(extends_type, out);
            collect_refs(true_type, out);
            collect_refs(false_type, out);
        }
        TsType::Raw(text) => collect_raw_refs(text, out),
        TsType::StringLiteral(_) | TsType::NumberLiteral(_) | TsType::Keyword(_) => {}
    }
}

fn collect_member_refs(member: &ObjectMember, out: &mut Vec<TypeRef>) {
    match member {
        ObjectMember::Property { ty, .. } => {
            if let Some(ty) = ty {
                collect_refs(ty, out);
            }
        }
        ObjectMember::Method { signature, .. } | ObjectMember::Call(signature) => {
            for param in &signature.params {
                if let Some(ty) = &param.ty {
                    collect_refs(ty, out);
                }
            }
            if let Some(ret) = &signature.return_type {
                collect_refs(ret, out);
            }
        }
        ObjectMember::Index { key, value } => {
            collect_refs(key, out);
            collect_refs(value, out);
        }
    }
}

/// Best-effort identifier scan over raw (unmodeled) type text.
fn collect_raw_refs(text: &str, out: &mut Vec<TypeRef>) {
    const SKIP: &[&str] = &[
        "in", "keyof", "readonly", "as", "infer", "extends", "new", "typeof", "import",
    ];
    let tokens = lex(text);
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.kind == TokenKind::Ident
            && !SKIP.contains(&t.text.as_str())
            && !KEYWORD_TYPES.contains(&t.text.as_str())
        {
            // Property-name position (`name:`) is not a type reference, and
            // neither is a mapped-type binder (`[K in …`).
            let next = tokens.get(i + 1);
            if next.is_some_and(|n| n.text == ":" || n.text == "in") {
                i += 1;
                continue;
            }
            let mut parts = vec![t.text.clone()];
            let mut j = i + 1;
            while tokens.get(j).is_some_and(|n| n.text == ".")
                && tokens.get(j + 1).is_some_and(|n| n.kind == TokenKind::Ident)
            {
                parts.push(tokens[j + 1].text.clone());
                j += 2;
            }
            out.push(TypeRef::new(parts));
            i = j;
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_alias() {
        let module = parse_module("export type Items = Item[];");
        assert_eq!(module.decls.len(), 1);
        let decl = &module.decls[0];
        assert_eq!(decl.name, "Items");
        assert_eq!(decl.kind, DeclKind::TypeAlias);
        assert!(decl.exported);
        assert_eq!(decl.text, "export type Items = Item[];");
        assert_eq!(decl.refs.len(), 1);
        assert_eq!(decl.refs[0].written(), "Item");
        assert!(module.exports.contains_key("Items"));
    }

    #[test]
    fn test_type_params_are_not_refs() {
        let module = parse_module("export type Wrap<T> = { data: T; meta: Meta };");
        let refs: Vec<String> = module.decls[0].refs.iter().map(TypeRef::written).collect();
        assert_eq!(refs, vec!["Meta".to_string()]);
    }

    #[test]
    fn test_parse_interface_with_heritage() {
        let module = parse_module(
            "export interface ItemCreateSchema extends BaseSchema { name: string; item_type: ItemTypeData; }",
        );
        let decl = &module.decls[0];
        assert_eq!(decl.kind, DeclKind::Interface);
        let refs: Vec<String> = decl.refs.iter().map(TypeRef::written).collect();
        assert_eq!(refs, vec!["BaseSchema".to_string(), "ItemTypeData".to_string()]);
    }

    #[test]
    fn test_parse_class_methods_and_overloads() {
        let source = r"
export declare class Items {
    /** Lists all items.
     * Read more: https://www.datocms.com/docs/content-management-api/resources/item/instances
     */
    list(queryParams?: SimpleSchemaTypes.ItemInstancesHrefSchema): Promise<SimpleSchemaTypes.ItemInstancesTargetSchema>;
    rawList(queryParams?: SchemaTypes.ItemInstancesHrefSchema): Promise<SchemaTypes.ItemInstancesTargetSchema>;
}
";
        let module = parse_module(source);
        let decl = &module.decls[0];
        assert_eq!(decl.kind, DeclKind::Class);
        let class = decl.class.as_ref().unwrap();
        assert_eq!(class.methods.len(), 2);
        assert_eq!(class.methods[0].name, "list");
        assert!(class.methods[0]
            .doc
            .as_deref()
            .unwrap()
            .contains("Read more:"));
        assert!(class.methods[0].signature.params[0].optional);
        let ret = class.methods[0].signature.return_type.as_ref().unwrap();
        assert!(ret.to_string().starts_with("Promise<"));
    }

    #[test]
    fn test_parse_class_extends() {
        let module = parse_module("export declare class Items extends BaseResource { }");
        let class = module.decls[0].class.as_ref().unwrap();
        assert_eq!(class.extends[0].written(), "BaseResource");
    }

    #[test]
    fn test_parse_imports() {
        let module = parse_module(
            "import * as SchemaTypes from './SchemaTypes.js';\nimport { Client } from '../client.js';\n",
        );
        assert_eq!(
            module.imports.get("SchemaTypes"),
            Some(&ImportTarget::Namespace {
                specifier: "./SchemaTypes.js".to_string()
            })
        );
        assert_eq!(
            module.imports.get("Client"),
            Some(&ImportTarget::Named {
                specifier: "../client.js".to_string(),
                imported: "Client".to_string()
            })
        );
    }

    #[test]
    fn test_parse_reexports() {
        let module = parse_module(
            "export * as ApiTypes from './generated/ApiTypes.js';\nexport { Items } from './resources/Items.js';\nexport * from './errors.js';\n",
        );
        assert_eq!(
            module.exports.get("ApiTypes"),
            Some(&Export::NamespaceReexport {
                specifier: "./generated/ApiTypes.js".to_string()
            })
        );
        assert_eq!(
            module.exports.get("Items"),
            Some(&Export::Reexport {
                specifier: "./resources/Items.js".to_string(),
                imported: "Items".to_string()
            })
        );
        assert_eq!(module.star_exports, vec!["./errors.js".to_string()]);
    }

    #[test]
    fn test_parse_namespace_flattening() {
        let source = r"
declare namespace SchemaTypes {
    type ItemData = { id: string };
    interface Item { data: ItemData }
}
export { SchemaTypes };
";
        let module = parse_module(source);
        let names: Vec<&str> = module.decls.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"SchemaTypes"));
        assert!(names.contains(&"SchemaTypes.ItemData"));
        assert!(names.contains(&"SchemaTypes.Item"));

        let ns = module
            .decls
            .iter()
            .find(|d| d.name == "SchemaTypes")
            .unwrap();
        assert_eq!(ns.kind, DeclKind::Namespace);
        assert_eq!(
            ns.namespace_members,
            vec!["SchemaTypes.ItemData".to_string(), "SchemaTypes.Item".to_string()]
        );
    }

    #[test]
    fn test_union_and_literal_types() {
        let module = parse_module(r#"export type FieldType = "string" | "text" | "boolean";"#);
        assert!(module.decls[0].refs.is_empty());
        assert_eq!(module.decls[0].kind, DeclKind::TypeAlias);
    }

    #[test]
    fn test_qualified_refs_survive() {
        let module =
            parse_module("export type Result = Promise<SchemaTypes.ItemInstancesTargetSchema>;");
        let refs: Vec<String> = module.decls[0].refs.iter().map(TypeRef::written).collect();
        assert_eq!(
            refs,
            vec![
                "Promise".to_string(),
                "SchemaTypes.ItemInstancesTargetSchema".to_string()
            ]
        );
    }

    #[test]
    fn test_mapped_type_falls_back_to_raw() {
        let module = parse_module("export type Partialish<T> = { [K in keyof T]?: T[K] };");
        // No refs outside the type-parameter binders.
        assert!(module.decls[0].refs.is_empty());
    }

    #[test]
    fn test_conditional_type() {
        let module = parse_module("export type Unwrap<T> = T extends Promise<infer U> ? U : T;");
        let refs: Vec<String> = module.decls[0].refs.iter().map(TypeRef::written).collect();
        // `U` is an `infer` binder; it survives collection but can never
        // resolve against the module graph, which drops it downstream.
        assert_eq!(refs, vec!["Promise".to_string(), "U".to_string()]);
    }

    #[test]
    fn test_function_and_var_decls() {
        let module = parse_module(
            "export declare function buildClient(config: ClientConfigOptions): Client;\nexport declare const VERSION: string;",
        );
        assert_eq!(module.decls.len(), 2);
        assert_eq!(module.decls[0].kind, DeclKind::Function);
        let refs: Vec<String> = module.decls[0].refs.iter().map(TypeRef::written).collect();
        assert_eq!(refs, vec!["ClientConfigOptions".to_string(), "Client".to_string()]);
        assert_eq!(module.decls[1].kind, DeclKind::Var);
    }

    #[test]
    fn test_export_equals() {
        let module = parse_module("declare const client: Client;\nexport = client;");
        assert_eq!(module.export_equals, Some("client".to_string()));
    }

    #[test]
    fn test_decl_text_excludes_leading_comment() {
        let module = parse_module("/** Docs here */\nexport type A = string;");
        assert_eq!(module.decls[0].text, "export type A = string;");
        assert_eq!(module.decls[0].doc.as_deref(), Some("Docs here"));
    }

    #[test]
    fn test_ambient_module_is_skipped() {
        let module = parse_module("declare module 'foo' { export type X = number; }\nexport type Y = string;");
        let names: Vec<&str> = module.decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Y"]);
    }
}
