//! The type program: a built-once module graph over the client's `.d.ts`
//! files.
//!
//! Every signature or dependency extraction goes through one program so
//! that symbols compare by identity across calls: a symbol is
//! `(module, declaration name)`, which is what keeps `ApiTypes.Foo` and
//! `RawApiTypes.Foo` apart even though both print as `Foo`.
//!
//! Only files reachable from the configured package roots are loaded.
//! References into TypeScript's own lib or into unrelated dependencies never
//! resolve and are silently skipped downstream, which is exactly the
//! behavior the extractors want.

use crate::ast::{Decl, DeclKind, TypeRef};
use crate::parser::{parse_module, Export, ImportTarget, ParsedModule};
use dato_mcp_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

/// Index of a module inside the program.
pub type ModuleId = usize;

/// Identity of a declaration: the module it lives in plus its (possibly
/// dotted) name. Two symbols with equal names but different modules are
/// different symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolId {
    /// Module the declaration lives in.
    pub module: ModuleId,
    /// Declaration name within the module.
    pub name: String,
}

/// What a name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A concrete declaration.
    Symbol(SymbolId),
    /// A whole module, via `import * as NS` or `export * as NS`.
    Module(ModuleId),
}

/// One loaded module file.
#[derive(Debug)]
pub struct Module {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Parse result.
    pub parsed: ParsedModule,
    /// Declaration name → indices into `parsed.decls` (interface merging
    /// yields several).
    pub decl_index: HashMap<String, Vec<usize>>,
    /// Module specifier → loaded module, for every resolvable specifier.
    pub resolved_specifiers: HashMap<String, ModuleId>,
}

/// The built-once program shared by all extractors.
#[derive(Debug)]
pub struct TypeProgram {
    modules: Vec<Module>,
    root: ModuleId,
    client: SymbolId,
}

impl TypeProgram {
    /// Builds a program rooted at `root_dts`.
    ///
    /// `packages` maps bare package names (e.g. `@datocms/cma-client`) to
    /// their entry declaration file; only these packages participate in the
    /// graph. Fails loudly when the graph does not expose a `Client` class
    /// from the root module.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when a reachable file cannot be read and
    /// [`Error::TypeProgram`] when the `Client` class is absent.
    pub fn build(root_dts: &Path, packages: &HashMap<String, PathBuf>) -> Result<Self> {
        let mut loader = Loader {
            packages,
            modules: Vec::new(),
            by_path: HashMap::new(),
        };
        let root = loader.load(root_dts)?;
        let modules = loader.modules;

        let mut program = Self {
            modules,
            root,
            client: SymbolId {
                module: root,
                name: String::new(),
            },
        };

        let client = program
            .resolve_export(root, "Client", &mut HashSet::new())
            .and_then(|resolution| match resolution {
                Resolution::Symbol(sym) => Some(sym),
                Resolution::Module(_) => None,
            })
            .filter(|sym| {
                program
                    .decls_of(sym)
                    .iter()
                    .any(|d| d.kind == DeclKind::Class)
            })
            .ok_or_else(|| Error::TypeProgram {
                message: format!(
                    "no `Client` class exported from {}",
                    root_dts.display()
                ),
            })?;

        tracing::debug!(
            modules = program.modules.len(),
            client_module = %program.modules[client.module].path.display(),
            "type program built"
        );
        program.client = client;
        Ok(program)
    }

    /// The root module.
    #[must_use]
    pub const fn root(&self) -> ModuleId {
        self.root
    }

    /// The located `Client` class symbol.
    #[must_use]
    pub const fn client_class(&self) -> &SymbolId {
        &self.client
    }

    /// Number of loaded modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Path of a module.
    #[must_use]
    pub fn module_path(&self, module: ModuleId) -> &Path {
        &self.modules[module].path
    }

    /// All declarations carrying the symbol's name, in source order.
    #[must_use]
    pub fn decls_of(&self, symbol: &SymbolId) -> Vec<&Decl> {
        let module = &self.modules[symbol.module];
        module
            .decl_index
            .get(&symbol.name)
            .map(|indices| indices.iter().map(|&i| &module.parsed.decls[i]).collect())
            .unwrap_or_default()
    }

    /// Resolves an exported `name` of `module`, following re-exports.
    pub(crate) fn resolve_export(
        &self,
        module: ModuleId,
        name: &str,
        visited: &mut HashSet<(ModuleId, String)>,
    ) -> Option<Resolution> {
        if !visited.insert((module, name.to_string())) {
            return None;
        }
        let m = &self.modules[module];

        if let Some(export) = m.parsed.exports.get(name) {
            return match export {
                Export::Named(local) => self.resolve_local(module, local, visited),
                Export::Reexport {
                    specifier,
                    imported,
                } => {
                    let target = *m.resolved_specifiers.get(specifier)?;
                    self.resolve_export(target, imported, visited)
                }
                Export::NamespaceReexport { specifier } => {
                    Some(Resolution::Module(*m.resolved_specifiers.get(specifier)?))
                }
            };
        }

        // `export * from …` fan-out, first match wins in source order.
        for specifier in &m.parsed.star_exports {
            if let Some(&target) = m.resolved_specifiers.get(specifier) {
                if let Some(resolution) = self.resolve_export(target, name, visited) {
                    return Some(resolution);
                }
            }
        }

        None
    }

    /// Resolves a plain name in a module scope: local declarations first,
    /// then import bindings.
    fn resolve_local(
        &self,
        module: ModuleId,
        name: &str,
        visited: &mut HashSet<(ModuleId, String)>,
    ) -> Option<Resolution> {
        let m = &self.modules[module];

        if m.decl_index.contains_key(name) {
            return Some(Resolution::Symbol(SymbolId {
                module,
                name: name.to_string(),
            }));
        }

        match m.parsed.imports.get(name)? {
            ImportTarget::Named {
                specifier,
                imported,
            } => {
                let target = *m.resolved_specifiers.get(specifier)?;
                self.resolve_export(target, imported, visited)
            }
            ImportTarget::Namespace { specifier } => {
                Some(Resolution::Module(*m.resolved_specifiers.get(specifier)?))
            }
        }
    }

    /// Resolves a reference as written inside `module` (qualified names walk
    /// through namespace imports, namespace declarations, and re-exported
    /// modules).
    #[must_use]
    pub fn resolve_ref(&self, module: ModuleId, reference: &TypeRef) -> Option<Resolution> {
        let mut visited = HashSet::new();

        let mut current = if let Some(specifier) = &reference.import_specifier {
            let target = *self.modules[module].resolved_specifiers.get(specifier)?;
            let mut resolution = Resolution::Module(target);
            for part in &reference.parts {
                resolution = self.step(resolution, part, &mut visited)?;
            }
            return Some(resolution);
        } else {
            let first = reference.parts.first()?;
            match self.resolve_local(module, first, &mut visited) {
                Some(resolution) => resolution,
                // Names like `ApiTypes` may exist only in the export table
                // (`export * as ApiTypes from …`); fall back to it.
                None => self.resolve_export(module, first, &mut HashSet::new())?,
            }
        };

        for part in &reference.parts[1..] {
            current = self.step(current, part, &mut visited)?;
        }
        Some(current)
    }

    fn step(
        &self,
        from: Resolution,
        part: &str,
        visited: &mut HashSet<(ModuleId, String)>,
    ) -> Option<Resolution> {
        match from {
            Resolution::Module(module) => self.resolve_export(module, part, visited),
            Resolution::Symbol(symbol) => {
                // Dotted lookup into a namespace declaration.
                let nested = format!("{}.{part}", symbol.name);
                let module = &self.modules[symbol.module];
                if module.decl_index.contains_key(&nested) {
                    Some(Resolution::Symbol(SymbolId {
                        module: symbol.module,
                        name: nested,
                    }))
                } else {
                    None
                }
            }
        }
    }

    /// Searches the whole program for an exported declaration whose name (or
    /// dotted suffix) equals `name`. Used to resolve user-provided type
    /// names outside any signature context.
    #[must_use]
    pub fn find_symbol_by_name(&self, name: &str) -> Option<SymbolId> {
        for (id, module) in self.modules.iter().enumerate() {
            if module.decl_index.contains_key(name) {
                return Some(SymbolId {
                    module: id,
                    name: name.to_string(),
                });
            }
        }
        // Fall back to namespace members by last segment.
        for (id, module) in self.modules.iter().enumerate() {
            for decl_name in module.decl_index.keys() {
                if decl_name.rsplit('.').next() == Some(name) {
                    return Some(SymbolId {
                        module: id,
                        name: decl_name.clone(),
                    });
                }
            }
        }
        None
    }
}

struct Loader<'a> {
    packages: &'a HashMap<String, PathBuf>,
    modules: Vec<Module>,
    by_path: HashMap<PathBuf, ModuleId>,
}

impl Loader<'_> {
    fn load(&mut self, path: &Path) -> Result<ModuleId> {
        let normalized = normalize(path);
        if let Some(&id) = self.by_path.get(&normalized) {
            return Ok(id);
        }

        let source = std::fs::read_to_string(&normalized)
            .map_err(|e| Error::io(format!("reading {}", normalized.display()), e))?;
        let parsed = parse_module(&source);

        let mut decl_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, decl) in parsed.decls.iter().enumerate() {
            decl_index.entry(decl.name.clone()).or_default().push(i);
        }

        let id = self.modules.len();
        self.by_path.insert(normalized.clone(), id);
        self.modules.push(Module {
            path: normalized.clone(),
            parsed,
            decl_index,
            resolved_specifiers: HashMap::new(),
        });

        // Resolve and load every referenced specifier. Unresolvable ones
        // (TS lib, dependencies outside the package map) are simply absent
        // from the table.
        let specifiers: Vec<String> = {
            let mut all = self.modules[id].parsed.specifiers.clone();
            for decl in &self.modules[id].parsed.decls {
                for r in &decl.refs {
                    if let Some(spec) = &r.import_specifier {
                        all.push(spec.clone());
                    }
                }
            }
            all.sort();
            all.dedup();
            all
        };

        let dir = normalized
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        for specifier in specifiers {
            if let Some(target_path) = self.resolve_specifier(&dir, &specifier) {
                match self.load(&target_path) {
                    Ok(target) => {
                        self.modules[id]
                            .resolved_specifiers
                            .insert(specifier, target);
                    }
                    Err(error) => {
                        tracing::warn!(%specifier, %error, "skipping unloadable module");
                    }
                }
            }
        }

        Ok(id)
    }

    fn resolve_specifier(&self, dir: &Path, specifier: &str) -> Option<PathBuf> {
        if specifier.starts_with('.') {
            let base = dir.join(specifier);
            return first_existing(&candidates(&base));
        }

        // Bare specifier: longest matching configured package wins.
        let mut best: Option<(&String, &PathBuf)> = None;
        for (name, entry) in self.packages {
            if specifier == *name || specifier.starts_with(&format!("{name}/")) {
                if best.is_none_or(|(b, _)| name.len() > b.len()) {
                    best = Some((name, entry));
                }
            }
        }
        let (name, entry) = best?;
        if specifier == *name {
            return Some(entry.clone());
        }
        let sub = &specifier[name.len() + 1..];
        let base = entry.parent()?.join(sub);
        first_existing(&candidates(&base))
    }
}

fn candidates(base: &Path) -> Vec<PathBuf> {
    let display = base.to_string_lossy();
    let mut list = Vec::new();
    if display.ends_with(".d.ts") {
        list.push(base.to_path_buf());
    } else if let Some(stem) = display
        .strip_suffix(".js")
        .or_else(|| display.strip_suffix(".ts"))
    {
        list.push(PathBuf::from(format!("{stem}.d.ts")));
        list.push(PathBuf::from(format!("{stem}/index.d.ts")));
    } else {
        list.push(PathBuf::from(format!("{display}.d.ts")));
        list.push(base.join("index.d.ts"));
    }
    list
}

fn first_existing(paths: &[PathBuf]) -> Option<PathBuf> {
    paths.iter().find(|p| p.exists()).map(|p| normalize(p))
}

/// Lexically folds `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves the entry declaration file of an installed npm package by
/// reading its `package.json` (`types`, then `typings`, then `index.d.ts`).
///
/// # Errors
///
/// Returns [`Error::Io`] when the package manifest cannot be read and
/// [`Error::TypeProgram`] when no declaration entry exists on disk.
pub fn resolve_package_types(node_modules: &Path, package: &str) -> Result<PathBuf> {
    let package_dir = node_modules.join(package);
    let manifest_path = package_dir.join("package.json");
    let manifest = std::fs::read_to_string(&manifest_path)
        .map_err(|e| Error::io(format!("reading {}", manifest_path.display()), e))?;
    let manifest: serde_json::Value = serde_json::from_str(&manifest)?;

    let entry = manifest
        .get("types")
        .or_else(|| manifest.get("typings"))
        .and_then(|v| v.as_str())
        .unwrap_or("index.d.ts");

    let path = normalize(&package_dir.join(entry));
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::TypeProgram {
            message: format!(
                "package {package} has no declaration entry at {}",
                path.display()
            ),
        })
    }
}
