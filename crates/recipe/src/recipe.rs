//! Recipe loading, classification and hook invocation

use crate::api::{self, HookCtx, Runtime};
use crate::hookdata::{
    alloc_build_config, alloc_dep_infos, alloc_dirs, alloc_resolve_config, BuildDirs, DepInfo,
};
use crate::RECIPE_FILE;
use dop_errors::{Error, RecipeError};
use dop_profile::{BuildConfig, ResolveConfig};
use dop_types::{DepKind, DepSpec, OptionSet, Version};
use starlark::environment::{FrozenModule, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::dict::DictRef;
use starlark::values::list::ListRef;
use starlark::values::{Heap, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Whether a recipe builds something or only aggregates dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeType {
    /// Has a `build` hook, produces an installed artifact
    Pack,
    /// No `build` hook; must declare dependencies
    Light,
}

/// Metadata declared by a recipe's `recipe()` function, plus the hooks
/// discovered in the script
#[derive(Debug, Clone)]
pub struct RecipeMeta {
    pub name: Option<String>,
    pub version: Option<Version>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub copyright: Option<String>,
    pub tools: Vec<String>,
    pub modules: Vec<String>,
    /// Source tree shipped with the recipe instead of fetched by `source()`
    pub in_tree_src: Option<String>,
    /// Declared `"stage": False`: the build couples to its stage destination
    pub stage_false: bool,
    pub recipe_type: RecipeType,
    pub has_source_hook: bool,
    pub has_build_hook: bool,
    pub has_dependencies_hook: bool,
    pub has_include_hook: bool,
    pub has_stage_hook: bool,
    pub has_post_stage_hook: bool,
}

struct Inner {
    dir: PathBuf,
    meta: RecipeMeta,
    module: FrozenModule,
    runtime: Runtime,
    revision: OnceLock<String>,
}

/// A loaded recipe
///
/// Cheap to clone; all clones share one frozen script and one runtime
/// state.
#[derive(Clone)]
pub struct Recipe {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("dir", &self.inner.dir)
            .field("meta", &self.inner.meta)
            .finish_non_exhaustive()
    }
}

#[derive(Default, Clone, Copy)]
struct DeclaredHooks {
    recipe: bool,
    source: bool,
    build: bool,
    dependencies: bool,
    include: bool,
    stage: bool,
    post_stage: bool,
}

/// Arguments handed to a hook call
enum HookArgs<'a> {
    None,
    Str(&'a str),
    Build(&'a BuildDirs, &'a BuildConfig, &'a BTreeMap<String, DepInfo>),
    Resolve(&'a ResolveConfig),
}

fn alloc_args<'v>(heap: &'v Heap, args: &HookArgs<'_>) -> Vec<Value<'v>> {
    match args {
        HookArgs::None => Vec::new(),
        HookArgs::Str(s) => vec![heap.alloc(*s)],
        HookArgs::Build(dirs, config, deps) => vec![
            alloc_dirs(heap, dirs),
            alloc_build_config(heap, config),
            alloc_dep_infos(heap, deps),
        ],
        HookArgs::Resolve(config) => vec![alloc_resolve_config(heap, config)],
    }
}

/// What a hook call is expected to return
enum HookShape {
    Unit,
    Str,
    StrList,
    Deps,
    MetaDict,
}

/// A hook result, read out of the evaluation heap before it goes away
enum HookOut {
    Unit,
    Str(String),
    StrList(Vec<String>),
    Deps(Vec<DepSpec>),
    Meta(MetaFields),
}

/// The plain fields of a `recipe()` dict
#[derive(Default)]
struct MetaFields {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    license: Option<String>,
    copyright: Option<String>,
    tools: Vec<String>,
    modules: Vec<String>,
    src: Option<String>,
    stage_false: bool,
}

impl Recipe {
    /// Load and validate the recipe in `dir`
    ///
    /// # Errors
    ///
    /// Returns a `RecipeError` when the script cannot be read or parsed, or
    /// the declared metadata violates the pack/light contract.
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let file = dir.join(RECIPE_FILE);
        let display = file.display().to_string();
        let content = std::fs::read_to_string(&file).map_err(|e| RecipeError::LoadFailed {
            path: display.clone(),
            message: e.to_string(),
        })?;

        let ast = AstModule::parse(RECIPE_FILE, content, &Dialect::Extended).map_err(|e| {
            RecipeError::LoadFailed {
                path: display.clone(),
                message: e.to_string(),
            }
        })?;

        let runtime = Runtime::new(dir.to_path_buf());
        let globals = api::globals();

        let module = Module::new();
        {
            let hook_ctx = HookCtx::new(runtime.clone());
            let mut eval = Evaluator::new(&module);
            eval.extra = Some(&hook_ctx);
            eval.eval_module(ast, &globals)
                .map_err(|e| RecipeError::LoadFailed {
                    path: display.clone(),
                    message: e.to_string(),
                })?;
        }
        let frozen = module.freeze().map_err(|e| RecipeError::LoadFailed {
            path: display.clone(),
            message: e.err_msg.clone(),
        })?;

        let mut declared = DeclaredHooks::default();
        for name in frozen.names() {
            match name.as_str() {
                "recipe" => declared.recipe = true,
                "source" => declared.source = true,
                "build" => declared.build = true,
                "dependencies" => declared.dependencies = true,
                "include" => declared.include = true,
                "stage" => declared.stage = true,
                "post_stage" => declared.post_stage = true,
                _ => {}
            }
        }
        if !declared.recipe {
            return Err(RecipeError::MissingField {
                field: "recipe".to_string(),
            }
            .into());
        }

        let out = call_function(&frozen, &runtime, "recipe", &HookArgs::None, &HookShape::MetaDict)?;
        let HookOut::Meta(fields) = out else {
            return Err(Error::internal("recipe() result shape mismatch"));
        };
        let meta = finish_meta(fields, declared)?;
        validate_meta(&meta)?;

        Ok(Self {
            inner: Arc::new(Inner {
                dir: dir.to_path_buf(),
                meta,
                module: frozen,
                runtime,
                revision: OnceLock::new(),
            }),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Absolute path of the recipe file
    #[must_use]
    pub fn file(&self) -> PathBuf {
        self.inner.dir.join(RECIPE_FILE)
    }

    #[must_use]
    pub fn meta(&self) -> &RecipeMeta {
        &self.inner.meta
    }

    #[must_use]
    pub fn recipe_type(&self) -> RecipeType {
        self.inner.meta.recipe_type
    }

    #[must_use]
    pub fn is_light(&self) -> bool {
        self.inner.meta.recipe_type == RecipeType::Light
    }

    /// Declared name, falling back to the directory name for light recipes
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.meta.name.clone().unwrap_or_else(|| {
            self.inner
                .dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "root".to_string())
        })
    }

    /// Declared version, falling back to `0.0.0` for light recipes
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner
            .meta
            .version
            .clone()
            .unwrap_or_else(|| Version::new(0, 0, 0))
    }

    /// The recipe revision: a content hash over the recipe file and every
    /// file listed by `include()`
    ///
    /// # Errors
    ///
    /// Returns an error if an included file cannot be read.
    pub fn revision(&self) -> Result<String, Error> {
        if let Some(rev) = self.inner.revision.get() {
            return Ok(rev.clone());
        }
        let rev = crate::revision::compute(self)?;
        Ok(self.inner.revision.get_or_init(|| rev).clone())
    }

    /// Working directory used by the helper API (`run_cmd`, `cwd`, ...)
    pub fn set_cwd(&self, dir: &Path) {
        self.inner.runtime.set_cwd(dir.to_path_buf());
    }

    /// Environment injected into processes spawned by the helper API
    pub fn set_env(&self, vars: Vec<(String, String)>) {
        self.inner.runtime.set_env(vars);
    }

    /// Invoke `source()`; returns the source directory relative to the
    /// recipe directory
    ///
    /// # Errors
    ///
    /// Returns an error if the hook fails or does not return a string.
    pub fn source(&self) -> Result<String, Error> {
        match self.call_hook("source", &HookArgs::None, &HookShape::Str)? {
            HookOut::Str(s) => Ok(s),
            _ => Err(Error::internal("source() result shape mismatch")),
        }
    }

    /// Invoke `build(dirs, config, deps)`
    ///
    /// # Errors
    ///
    /// Returns an error if the hook fails.
    pub fn build(
        &self,
        dirs: &BuildDirs,
        config: &BuildConfig,
        deps: &BTreeMap<String, DepInfo>,
    ) -> Result<(), Error> {
        self.call_hook(
            "build",
            &HookArgs::Build(dirs, config, deps),
            &HookShape::Unit,
        )
        .map(drop)
    }

    /// Invoke `dependencies(config)` and parse its result
    ///
    /// Entries are either `"name >=1.0"` strings or dicts with `name`,
    /// `spec`, `kind` and `options` keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the hook fails or an entry cannot be parsed.
    pub fn dependencies(&self, config: &ResolveConfig) -> Result<Vec<DepSpec>, Error> {
        if !self.inner.meta.has_dependencies_hook {
            return Ok(Vec::new());
        }
        match self.call_hook("dependencies", &HookArgs::Resolve(config), &HookShape::Deps)? {
            HookOut::Deps(deps) => Ok(deps),
            _ => Err(Error::internal("dependencies() result shape mismatch")),
        }
    }

    /// Invoke `include()`; paths are relative to the recipe directory
    ///
    /// # Errors
    ///
    /// Returns an error if the hook fails or returns non-strings.
    pub fn include(&self) -> Result<Vec<String>, Error> {
        if !self.inner.meta.has_include_hook {
            return Ok(Vec::new());
        }
        match self.call_hook("include", &HookArgs::None, &HookShape::StrList)? {
            HookOut::StrList(files) => Ok(files),
            _ => Err(Error::internal("include() result shape mismatch")),
        }
    }

    /// Invoke `stage(dest)`
    ///
    /// # Errors
    ///
    /// Returns an error if the hook fails.
    pub fn stage(&self, dest: &Path) -> Result<(), Error> {
        let dest = dest.display().to_string();
        self.call_hook("stage", &HookArgs::Str(&dest), &HookShape::Unit)
            .map(drop)
    }

    /// Invoke `post_stage()`
    ///
    /// # Errors
    ///
    /// Returns an error if the hook fails.
    pub fn post_stage(&self) -> Result<(), Error> {
        self.call_hook("post_stage", &HookArgs::None, &HookShape::Unit)
            .map(drop)
    }

    fn call_hook(
        &self,
        hook: &str,
        args: &HookArgs<'_>,
        shape: &HookShape,
    ) -> Result<HookOut, Error> {
        call_function(&self.inner.module, &self.inner.runtime, hook, args, shape)
    }
}

/// Run one function of a frozen recipe module in a fresh evaluator
fn call_function(
    module: &FrozenModule,
    runtime: &Runtime,
    hook: &str,
    args: &HookArgs<'_>,
    shape: &HookShape,
) -> Result<HookOut, Error> {
    let hook_failed = |e: &dyn std::fmt::Display| RecipeError::HookFailed {
        hook: hook.to_string(),
        message: e.to_string(),
    };

    let func = module.get(hook).map_err(|e| hook_failed(&e))?;

    let call_module = Module::new();
    let hook_ctx = HookCtx::new(runtime.clone());
    let mut eval = Evaluator::new(&call_module);
    eval.extra = Some(&hook_ctx);
    let args = alloc_args(call_module.heap(), args);
    let value = eval
        .eval_function(func.value(), &args, &[])
        .map_err(|e| hook_failed(&e))?;
    read_result(hook, value, shape)
}

fn read_result(hook: &str, value: Value<'_>, shape: &HookShape) -> Result<HookOut, Error> {
    let wrong_shape = |expected: &str| RecipeError::WrongShape {
        hook: hook.to_string(),
        message: format!("expected {expected}, got {}", value.get_type()),
    };

    match shape {
        HookShape::Unit => Ok(HookOut::Unit),
        HookShape::Str => value
            .unpack_str()
            .map(|s| HookOut::Str(s.to_string()))
            .ok_or_else(|| wrong_shape("a string").into()),
        HookShape::StrList => {
            let list = ListRef::from_value(value).ok_or_else(|| wrong_shape("a list"))?;
            let mut out = Vec::new();
            for item in list.iter() {
                let s = item.unpack_str().ok_or_else(|| RecipeError::WrongShape {
                    hook: hook.to_string(),
                    message: format!("expected strings, got {}", item.get_type()),
                })?;
                out.push(s.to_string());
            }
            Ok(HookOut::StrList(out))
        }
        HookShape::Deps => {
            let list = ListRef::from_value(value).ok_or_else(|| wrong_shape("a list"))?;
            let deps = list
                .iter()
                .map(parse_dep_entry)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(HookOut::Deps(deps))
        }
        HookShape::MetaDict => {
            let dict = DictRef::from_value(value).ok_or_else(|| wrong_shape("a dict"))?;
            Ok(HookOut::Meta(extract_fields(&dict)?))
        }
    }
}

fn get_string(dict: &DictRef, key: &str) -> Result<Option<String>, RecipeError> {
    match dict.get_str(key) {
        Some(value) => value
            .unpack_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| RecipeError::InvalidField {
                field: key.to_string(),
                message: format!("expected a string, got {}", value.get_type()),
            }),
        None => Ok(None),
    }
}

fn get_string_list(dict: &DictRef, key: &str) -> Result<Vec<String>, RecipeError> {
    let Some(value) = dict.get_str(key) else {
        return Ok(Vec::new());
    };
    let list = ListRef::from_value(value).ok_or_else(|| RecipeError::InvalidField {
        field: key.to_string(),
        message: format!("expected a list of strings, got {}", value.get_type()),
    })?;
    list.iter()
        .map(|item| {
            item.unpack_str()
                .map(str::to_string)
                .ok_or_else(|| RecipeError::InvalidField {
                    field: key.to_string(),
                    message: "expected a list of strings".to_string(),
                })
        })
        .collect()
}

fn extract_fields(dict: &DictRef) -> Result<MetaFields, Error> {
    // `"stage": True` is accepted and has no effect
    let stage_false = dict
        .get_str("stage")
        .and_then(|v| v.unpack_bool())
        .is_some_and(|stage| !stage);

    Ok(MetaFields {
        name: get_string(dict, "name")?,
        version: get_string(dict, "version")?,
        description: get_string(dict, "description")?,
        license: get_string(dict, "license")?,
        copyright: get_string(dict, "copyright")?,
        tools: get_string_list(dict, "tools")?,
        modules: get_string_list(dict, "modules")?,
        src: get_string(dict, "src")?,
        stage_false,
    })
}

fn finish_meta(fields: MetaFields, declared: DeclaredHooks) -> Result<RecipeMeta, Error> {
    let version = match fields.version {
        Some(s) => Some(Version::parse(&s).map_err(|e| RecipeError::InvalidField {
            field: "version".to_string(),
            message: e.to_string(),
        })?),
        None => None,
    };
    let recipe_type = if declared.build {
        RecipeType::Pack
    } else {
        RecipeType::Light
    };

    Ok(RecipeMeta {
        name: fields.name,
        version,
        description: fields.description,
        license: fields.license,
        copyright: fields.copyright,
        tools: fields.tools,
        modules: fields.modules,
        in_tree_src: fields.src,
        stage_false: fields.stage_false,
        recipe_type,
        has_source_hook: declared.source,
        has_build_hook: declared.build,
        has_dependencies_hook: declared.dependencies,
        has_include_hook: declared.include,
        has_stage_hook: declared.stage,
        has_post_stage_hook: declared.post_stage,
    })
}

fn validate_meta(meta: &RecipeMeta) -> Result<(), Error> {
    match meta.recipe_type {
        RecipeType::Pack => {
            if meta.name.is_none() {
                return Err(RecipeError::MissingField {
                    field: "name".to_string(),
                }
                .into());
            }
            if meta.version.is_none() {
                return Err(RecipeError::MissingField {
                    field: "version".to_string(),
                }
                .into());
            }
        }
        RecipeType::Light => {
            if !meta.has_dependencies_hook {
                return Err(RecipeError::LightWithoutDeps.into());
            }
        }
    }
    Ok(())
}

fn parse_dep_entry(entry: Value) -> Result<DepSpec, Error> {
    if let Some(s) = entry.unpack_str() {
        return DepSpec::parse(s, DepKind::Dop).map_err(Into::into);
    }

    let dict = DictRef::from_value(entry).ok_or_else(|| RecipeError::WrongShape {
        hook: "dependencies".to_string(),
        message: "entries must be strings or dicts".to_string(),
    })?;

    let name = get_string(&dict, "name")?.ok_or_else(|| RecipeError::WrongShape {
        hook: "dependencies".to_string(),
        message: "dependency dict is missing `name`".to_string(),
    })?;
    let spec = get_string(&dict, "spec")?.unwrap_or_default();
    let kind = match get_string(&dict, "kind")?.as_deref() {
        Some("dub") => DepKind::Dub,
        _ => DepKind::Dop,
    };

    let mut dep = DepSpec::parse(&format!("{name} {spec}"), kind)?;

    if let Some(value) = dict.get_str("options") {
        let opts = DictRef::from_value(value).ok_or_else(|| RecipeError::WrongShape {
            hook: "dependencies".to_string(),
            message: "`options` must be a dict".to_string(),
        })?;
        let mut options = OptionSet::new();
        for (key, val) in opts.iter() {
            let key = key.unpack_str().ok_or_else(|| RecipeError::WrongShape {
                hook: "dependencies".to_string(),
                message: "option keys must be strings".to_string(),
            })?;
            let val = val
                .unpack_str()
                .map_or_else(|| val.to_string(), str::to_string);
            options.set(key, val);
        }
        dep = dep.with_options(options);
    }
    Ok(dep)
}
