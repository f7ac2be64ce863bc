//! Generator dispatcher
//!
//! Generators turn a resolved graph into build-tool input files. Built-ins:
//!
//! | Name | Output |
//! |---|---|
//! | `CMakeDeps` | `<name>-config.cmake` per package, `kiln_deps.cmake` |
//! | `CMakeToolchain` | `kiln_toolchain.cmake` |
//! | `json` | `kiln_deps.json` |
//! | `txt` | `kiln_buildinfo.txt` |
//!
//! Further generators plug in through the [`Generator`] trait. All requested
//! names are checked before anything is written, and every file is rendered
//! in memory first, so identical inputs give byte-identical output.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::package::PackageNode;
use crate::core::resolver::ResolvedGraph;
use crate::core::settings::Settings;
use crate::error::GeneratorError;

/// Inputs shared by all generators
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext<'a> {
    /// Resolved packages in build order
    pub graph: &'a ResolvedGraph,
    /// Profile the graph was resolved for
    pub settings: &'a Settings,
}

/// A rendered output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// File name relative to the target directory
    pub name: String,
    /// File contents
    pub contents: String,
}

impl GeneratedFile {
    /// Create a new output file
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// A build-tool input generator
pub trait Generator: Send + Sync {
    /// Name used in recipes
    fn name(&self) -> &str;

    /// Render output files without touching the filesystem
    fn render(&self, ctx: &GeneratorContext<'_>) -> Result<Vec<GeneratedFile>, GeneratorError>;
}

/// Generators available by name
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Box<dyn Generator>>,
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("generators", &self.names())
            .finish()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl GeneratorRegistry {
    /// Registry with no generators
    pub fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// Registry with the built-in generators
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(CMakeDeps);
        registry.register(CMakeToolchain);
        registry.register(JsonGenerator);
        registry.register(TxtGenerator);
        registry
    }

    /// Register a generator, replacing any with the same name
    pub fn register(&mut self, generator: impl Generator + 'static) {
        self.generators
            .insert(generator.name().to_string(), Box::new(generator));
    }

    /// Registered generator names, sorted
    pub fn names(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    /// Run `names` against `graph` and write their output into `target_dir`
    ///
    /// Returns the written paths in generator order. Repeated names run once.
    pub fn emit<S: AsRef<str>>(
        &self,
        names: &[S],
        graph: &ResolvedGraph,
        settings: &Settings,
        target_dir: &Path,
    ) -> Result<Vec<PathBuf>, GeneratorError> {
        let mut selected: Vec<&dyn Generator> = Vec::new();
        for name in names {
            let name = name.as_ref();
            let generator = self
                .generators
                .get(name)
                .ok_or_else(|| GeneratorError::NotFound {
                    name: name.to_string(),
                    available: self.names(),
                })?;
            if !selected.iter().any(|g| g.name() == name) {
                selected.push(generator.as_ref());
            }
        }

        let ctx = GeneratorContext { graph, settings };
        let mut files = Vec::new();
        for generator in &selected {
            tracing::debug!("Rendering generator {}", generator.name());
            for file in generator.render(&ctx)? {
                if !is_plain_file_name(&file.name) {
                    return Err(GeneratorError::Render {
                        name: generator.name().to_string(),
                        error: format!("output '{}' escapes the target directory", file.name),
                    });
                }
                files.push(file);
            }
        }

        std::fs::create_dir_all(target_dir).map_err(|e| GeneratorError::Write {
            path: target_dir.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let path = target_dir.join(&file.name);
            std::fs::write(&path, file.contents.as_bytes()).map_err(|e| GeneratorError::Write {
                path: path.clone(),
                error: e.to_string(),
            })?;
            written.push(path);
        }

        tracing::info!(
            "Generated {} files in {}",
            written.len(),
            target_dir.display()
        );
        Ok(written)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

fn cmake_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

fn cmake_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(";")
}

/// CMake target name for a package
pub fn cmake_target(name: &str) -> String {
    format!("{name}::{name}")
}

/// CMake config-mode package files
#[derive(Debug, Clone, Copy, Default)]
pub struct CMakeDeps;

impl CMakeDeps {
    fn config_file(node: &PackageNode) -> String {
        let name = &node.name;
        let info = &node.cpp_info;
        let includes = cmake_list(node.include_paths().iter().map(|p| cmake_path(p)));
        let lib_dirs = cmake_list(node.lib_paths().iter().map(|p| cmake_path(p)));
        let dep_targets: Vec<String> = node.dependencies.iter().map(|d| cmake_target(d)).collect();

        let mut out = String::new();
        let _ = writeln!(out, "# {} (config {})", node.reference(), node.config_hash().short());
        if !node.dependencies.is_empty() {
            let _ = writeln!(out, "include(CMakeFindDependencyMacro)");
        }
        for dep in &node.dependencies {
            let _ = writeln!(out, "find_dependency({dep} REQUIRED CONFIG)");
        }
        let _ = writeln!(out, "set({name}_FOUND TRUE)");
        let _ = writeln!(out, "set({name}_VERSION \"{}\")", node.version);
        let _ = writeln!(out, "set({name}_PACKAGE_FOLDER \"{}\")", cmake_path(node.folder()));
        let _ = writeln!(out, "set({name}_INCLUDE_DIRS \"{includes}\")");
        let _ = writeln!(out, "set({name}_LIB_DIRS \"{lib_dirs}\")");
        let _ = writeln!(out, "set({name}_LIBS \"{}\")", cmake_list(&info.libs));
        let _ = writeln!(out, "set({name}_SYSTEM_LIBS \"{}\")", cmake_list(&info.system_libs));
        let _ = writeln!(out, "set({name}_DEFINITIONS \"{}\")", cmake_list(&info.defines));
        let _ = writeln!(out);
        let _ = writeln!(out, "if(NOT TARGET {})", cmake_target(name));
        let _ = writeln!(out, "  add_library({} INTERFACE IMPORTED)", cmake_target(name));
        let _ = writeln!(out, "  set_target_properties({} PROPERTIES", cmake_target(name));
        let _ = writeln!(out, "    INTERFACE_INCLUDE_DIRECTORIES \"${{{name}_INCLUDE_DIRS}}\"");
        let _ = writeln!(out, "    INTERFACE_LINK_DIRECTORIES \"${{{name}_LIB_DIRS}}\"");
        let _ = writeln!(
            out,
            "    INTERFACE_LINK_LIBRARIES \"{}\"",
            cmake_list(
                [
                    format!("${{{name}_LIBS}}"),
                    format!("${{{name}_SYSTEM_LIBS}}"),
                ]
                .into_iter()
                .chain(dep_targets)
            )
        );
        let _ = writeln!(out, "    INTERFACE_COMPILE_DEFINITIONS \"${{{name}_DEFINITIONS}}\")");
        let _ = writeln!(out, "endif()");
        out
    }
}

impl Generator for CMakeDeps {
    fn name(&self) -> &str {
        "CMakeDeps"
    }

    fn render(&self, ctx: &GeneratorContext<'_>) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let mut files: Vec<GeneratedFile> = ctx
            .graph
            .nodes()
            .iter()
            .map(|node| GeneratedFile::new(format!("{}-config.cmake", node.name), Self::config_file(node)))
            .collect();

        let mut aggregate = String::from("# Dependencies in build order\n");
        aggregate.push_str("list(PREPEND CMAKE_PREFIX_PATH \"${CMAKE_CURRENT_LIST_DIR}\")\n");
        for node in ctx.graph.nodes() {
            let _ = writeln!(
                aggregate,
                "include(\"${{CMAKE_CURRENT_LIST_DIR}}/{}-config.cmake\")",
                node.name
            );
        }
        files.push(GeneratedFile::new("kiln_deps.cmake", aggregate));
        Ok(files)
    }
}

/// CMake toolchain file carrying the profile
#[derive(Debug, Clone, Copy, Default)]
pub struct CMakeToolchain;

impl Generator for CMakeToolchain {
    fn name(&self) -> &str {
        "CMakeToolchain"
    }

    fn render(&self, ctx: &GeneratorContext<'_>) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let settings = ctx.settings;
        let mut out = String::new();
        let _ = writeln!(out, "# Profile {}", settings.key());
        let _ = writeln!(
            out,
            "set(CMAKE_BUILD_TYPE \"{}\" CACHE STRING \"Build type\" FORCE)",
            settings.build_type()
        );
        let _ = writeln!(out, "set(KILN_OS \"{}\")", settings.os());
        let _ = writeln!(out, "set(KILN_ARCH \"{}\")", settings.arch());
        let _ = writeln!(out, "set(KILN_COMPILER \"{}\")", settings.compiler());
        if let Some(version) = settings.get("compiler.version") {
            let _ = writeln!(out, "set(KILN_COMPILER_VERSION \"{version}\")");
        }
        if let Some(cppstd) = settings.get("compiler.cppstd") {
            let standard = cppstd.trim_start_matches("gnu");
            let _ = writeln!(out, "set(CMAKE_CXX_STANDARD {standard})");
            let _ = writeln!(out, "set(CMAKE_CXX_STANDARD_REQUIRED ON)");
            let extensions = if cppstd.starts_with("gnu") { "ON" } else { "OFF" };
            let _ = writeln!(out, "set(CMAKE_CXX_EXTENSIONS {extensions})");
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "list(PREPEND CMAKE_PREFIX_PATH \"${{CMAKE_CURRENT_LIST_DIR}}\")");
        for node in ctx.graph.nodes() {
            let _ = writeln!(
                out,
                "list(APPEND CMAKE_PREFIX_PATH \"{}\")",
                cmake_path(node.folder())
            );
        }
        let _ = writeln!(out, "set(CMAKE_FIND_PACKAGE_PREFER_CONFIG ON)");

        Ok(vec![GeneratedFile::new("kiln_toolchain.cmake", out)])
    }
}

#[derive(Serialize)]
struct JsonDeps<'a> {
    settings: BTreeMap<&'a str, &'a str>,
    build_order: Vec<&'a str>,
    packages: Vec<JsonPackage<'a>>,
}

#[derive(Serialize)]
struct JsonPackage<'a> {
    name: &'a str,
    version: &'a str,
    config_hash: String,
    package_folder: String,
    dependencies: &'a [String],
    options: &'a BTreeMap<String, String>,
    include_dirs: Vec<String>,
    lib_dirs: Vec<String>,
    libs: &'a [String],
    system_libs: &'a [String],
    defines: &'a [String],
}

/// Machine-readable dependency description
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonGenerator;

impl Generator for JsonGenerator {
    fn name(&self) -> &str {
        "json"
    }

    fn render(&self, ctx: &GeneratorContext<'_>) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let doc = JsonDeps {
            settings: ctx.settings.entries().into_iter().collect(),
            build_order: ctx.graph.build_order(),
            packages: ctx
                .graph
                .nodes()
                .iter()
                .map(|node| JsonPackage {
                    name: &node.name,
                    version: &node.version,
                    config_hash: node.config_hash().to_string(),
                    package_folder: cmake_path(node.folder()),
                    dependencies: &node.dependencies,
                    options: &node.options,
                    include_dirs: node.include_paths().iter().map(|p| cmake_path(p)).collect(),
                    lib_dirs: node.lib_paths().iter().map(|p| cmake_path(p)).collect(),
                    libs: &node.cpp_info.libs,
                    system_libs: &node.cpp_info.system_libs,
                    defines: &node.cpp_info.defines,
                })
                .collect(),
        };

        let mut contents = serde_json::to_string_pretty(&doc).map_err(|e| GeneratorError::Render {
            name: self.name().to_string(),
            error: e.to_string(),
        })?;
        contents.push('\n');
        Ok(vec![GeneratedFile::new("kiln_deps.json", contents)])
    }
}

/// Plain-text build info in INI-like sections
#[derive(Debug, Clone, Copy, Default)]
pub struct TxtGenerator;

impl Generator for TxtGenerator {
    fn name(&self) -> &str {
        "txt"
    }

    fn render(&self, ctx: &GeneratorContext<'_>) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let mut out = String::from("[settings]\n");
        for (key, value) in ctx.settings.entries() {
            let _ = writeln!(out, "{key}={value}");
        }

        out.push_str("\n[packages]\n");
        for node in ctx.graph.nodes() {
            let _ = writeln!(out, "{} {}", node.reference(), node.config_hash().short());
        }

        for node in ctx.graph.nodes() {
            let sections: [(&str, Vec<String>); 4] = [
                ("includedirs", node.include_paths().iter().map(|p| cmake_path(p)).collect()),
                ("libdirs", node.lib_paths().iter().map(|p| cmake_path(p)).collect()),
                ("libs", node.cpp_info.libs.clone()),
                ("defines", node.cpp_info.defines.clone()),
            ];
            for (section, values) in sections {
                if values.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "\n[{section}_{}]", node.name);
                for value in values {
                    let _ = writeln!(out, "{value}");
                }
            }
        }

        Ok(vec![GeneratedFile::new("kiln_buildinfo.txt", out)])
    }
}
