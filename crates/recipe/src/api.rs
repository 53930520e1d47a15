#![allow(clippy::needless_lifetimes)]
//! Helper API exposed to recipe scripts
//!
//! Everything a recipe may touch outside its own logic goes through here:
//! process spawning, file installation, pkg-config plumbing and path
//! utilities. The working directory and environment are per-recipe state
//! carried on the evaluator, not process-wide.

use crate::pcfile::PcFile;
use allocative::Allocative;
use starlark::environment::{Globals, GlobalsBuilder};
use starlark::eval::Evaluator;
use starlark::starlark_module;
use starlark::values::dict::DictRef;
use starlark::values::list::ListRef;
use starlark::values::none::NoneType;
use starlark::values::{
    AllocValue, Heap, ProvidesStaticType, StarlarkValue, Trace, UnpackValue, Value, ValueLike,
};
use starlark_derive::{starlark_value, NoSerialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct RuntimeState {
    cwd: PathBuf,
    env: Vec<(String, String)>,
}

/// Mutable per-recipe state shared between the host and the registered API
#[derive(Debug, Clone)]
pub(crate) struct Runtime {
    state: Arc<Mutex<RuntimeState>>,
}

impl Runtime {
    pub(crate) fn new(cwd: PathBuf) -> Self {
        Self {
            state: Arc::new(Mutex::new(RuntimeState {
                cwd,
                env: Vec::new(),
            })),
        }
    }

    pub(crate) fn set_cwd(&self, cwd: PathBuf) {
        self.lock().cwd = cwd;
    }

    pub(crate) fn set_env(&self, env: Vec<(String, String)>) {
        self.lock().env = env;
    }

    fn cwd(&self) -> PathBuf {
        self.lock().cwd.clone()
    }

    fn env(&self) -> Vec<(String, String)> {
        self.lock().env.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RuntimeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Attached to every evaluator through `Evaluator::extra` so the API
/// functions can reach the recipe's runtime state
#[derive(ProvidesStaticType)]
pub(crate) struct HookCtx {
    runtime: Runtime,
}

impl HookCtx {
    pub(crate) fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }
}

fn runtime<'v>(eval: &Evaluator<'v, '_, '_>) -> anyhow::Result<Runtime> {
    eval.extra
        .and_then(|extra| extra.downcast_ref::<HookCtx>())
        .map(|ctx| ctx.runtime.clone())
        .ok_or_else(|| anyhow::anyhow!("recipe runtime is not attached"))
}

/// File installation helper created by `installer(src, dest)`
///
/// Operations take the installer as their first argument:
/// `install_file(inst, "libz.a", "lib")`, `install_dir(inst, "include", "include")`.
#[derive(Debug, Clone, ProvidesStaticType, NoSerialize, Allocative)]
pub struct Installer {
    #[allocative(skip)]
    src: PathBuf,
    #[allocative(skip)]
    dest: PathBuf,
}

impl Installer {
    fn file(&self, rel: &str, relout: &str, rename: Option<&str>) -> anyhow::Result<()> {
        let from = self.src.join(rel);
        let name = match rename {
            Some(name) => name.to_string(),
            None => Path::new(rel)
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("installer: no file name in `{rel}`"))?
                .to_string_lossy()
                .into_owned(),
        };
        let to = self.dest.join(relout).join(name);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&from, &to).map_err(|e| {
            anyhow::anyhow!(
                "installer: copying {} to {}: {e}",
                from.display(),
                to.display()
            )
        })?;
        Ok(())
    }

    fn dir(&self, rel: &str, relout: &str) -> anyhow::Result<()> {
        let from = self.src.join(rel);
        let to = self.dest.join(relout);
        copy_tree(&from, &to).map_err(|e| {
            anyhow::anyhow!(
                "installer: copying {} to {}: {e}",
                from.display(),
                to.display()
            )
        })
    }
}

impl Display for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Installer(src={}, dest={})",
            self.src.display(),
            self.dest.display()
        )
    }
}

unsafe impl Trace<'_> for Installer {
    fn trace(&mut self, _tracer: &starlark::values::Tracer<'_>) {
        // no Value<'v> fields to trace
    }
}

#[starlark_value(type = "Installer")]
impl<'v> StarlarkValue<'v> for Installer {}

impl<'v> AllocValue<'v> for Installer {
    fn alloc_value(self, heap: &'v Heap) -> Value<'v> {
        heap.alloc_complex_no_freeze(self)
    }
}

impl<'v> UnpackValue<'v> for Installer {
    type Error = starlark::Error;

    fn unpack_value(value: Value<'v>) -> Result<Option<Self>, Self::Error> {
        Ok(value.request_value::<&Installer>().cloned())
    }

    fn unpack_value_impl(value: Value<'v>) -> Result<Option<Self>, Self::Error> {
        Ok(value.request_value::<&Installer>().cloned())
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn run_command(
    runtime: &Runtime,
    cmd: &[String],
    extra_env: &[(String, String)],
    workdir: Option<PathBuf>,
) -> anyhow::Result<String> {
    let Some((program, args)) = cmd.split_first() else {
        return Err(anyhow::anyhow!("run_cmd: empty command"));
    };
    let cwd = workdir.unwrap_or_else(|| runtime.cwd());
    let output = std::process::Command::new(program)
        .args(args)
        .current_dir(&cwd)
        .envs(runtime.env())
        .envs(extra_env.iter().cloned())
        .output()
        .map_err(|e| anyhow::anyhow!("run_cmd: spawning `{program}`: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow::anyhow!(
            "run_cmd: `{}` exited with {}: {}",
            cmd.join(" "),
            output.status,
            stderr.trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

fn string_list<'v>(value: Value<'v>, what: &str) -> anyhow::Result<Vec<String>> {
    let list = ListRef::from_value(value)
        .ok_or_else(|| anyhow::anyhow!("{what} must be a list of strings"))?;
    list.iter()
        .map(|item| {
            item.unpack_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("{what} must contain only strings"))
        })
        .collect()
}

fn string_map<'v>(value: Value<'v>, what: &str) -> anyhow::Result<Vec<(String, String)>> {
    let dict =
        DictRef::from_value(value).ok_or_else(|| anyhow::anyhow!("{what} must be a dict"))?;
    let mut pairs = Vec::new();
    for (key, val) in dict.iter() {
        let key = key
            .unpack_str()
            .ok_or_else(|| anyhow::anyhow!("{what} keys must be strings"))?;
        let val = val
            .unpack_str()
            .map_or_else(|| val.to_string(), str::to_string);
        pairs.push((key.to_string(), val));
    }
    Ok(pairs)
}

/// The globals every recipe evaluates against
pub(crate) fn globals() -> Globals {
    let mut builder = GlobalsBuilder::standard();
    builder.set("posix", cfg!(unix));
    builder.set("os", if cfg!(windows) { "windows" } else { "linux" });
    builder.set("path_sep", if cfg!(windows) { ";" } else { ":" });
    recipe_globals(&mut builder);
    builder.build()
}

/// Recipe helper functions
#[starlark_module]
#[allow(clippy::unnecessary_wraps)]
fn recipe_globals(builder: &mut GlobalsBuilder) {
    /// Run a command in the recipe's working directory, returning stdout
    ///
    /// Example:
    /// - run_cmd(["make", "install"])
    /// - run_cmd(["ninja"], env = {"CC": "gcc"}, workdir = "build")
    fn run_cmd<'v>(
        cmd: Value<'v>,
        env: Option<Value<'v>>,
        workdir: Option<&str>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> anyhow::Result<String> {
        let runtime = runtime(eval)?;
        let cmd = string_list(cmd, "run_cmd command")?;
        let extra_env = match env {
            Some(env) => string_map(env, "run_cmd env")?,
            None => Vec::new(),
        };
        run_command(&runtime, &cmd, &extra_env, workdir.map(PathBuf::from))
    }

    /// List the files git tracks below the working directory
    fn git_ls_files<'v>(
        submodules: Option<bool>,
        workdir: Option<&str>,
        eval: &mut Evaluator<'v, '_, '_>,
    ) -> anyhow::Result<Vec<String>> {
        let runtime = runtime(eval)?;
        let mut cmd = vec!["git".to_string(), "ls-files".to_string()];
        if submodules.unwrap_or(false) {
            cmd.push("--recurse-submodules".to_string());
        }
        let stdout = run_command(&runtime, &cmd, &[], workdir.map(PathBuf::from))?;
        Ok(stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Create an installation helper copying from `src` into `dest`
    fn installer(src: &str, dest: &str) -> anyhow::Result<Installer> {
        Ok(Installer {
            src: PathBuf::from(src),
            dest: PathBuf::from(dest),
        })
    }

    /// Copy one file, optionally renamed:
    /// `install_file(inst, "libz.a", "lib", rename = "libz2.a")`
    fn install_file<'v>(
        inst: Value<'v>,
        rel: &str,
        relout: &str,
        rename: Option<&str>,
    ) -> anyhow::Result<NoneType> {
        let inst = inst
            .downcast_ref::<Installer>()
            .ok_or_else(|| anyhow::anyhow!("first argument must be an Installer"))?;
        inst.file(rel, relout, rename)?;
        Ok(NoneType)
    }

    /// Copy a directory tree: `install_dir(inst, "include", "include")`
    fn install_dir<'v>(inst: Value<'v>, rel: &str, relout: &str) -> anyhow::Result<NoneType> {
        let inst = inst
            .downcast_ref::<Installer>()
            .ok_or_else(|| anyhow::anyhow!("first argument must be an Installer"))?;
        inst.dir(rel, relout)?;
        Ok(NoneType)
    }

    /// Join the `lib/pkgconfig` directories of a dependency map into a
    /// `PKG_CONFIG_PATH` value
    fn pkg_config_path<'v>(deps: Value<'v>) -> anyhow::Result<String> {
        let dict = DictRef::from_value(deps)
            .ok_or_else(|| anyhow::anyhow!("pkg_config_path takes the dep info dict"))?;
        let sep = if cfg!(windows) { ";" } else { ":" };
        let mut paths = Vec::new();
        for (_, entry) in dict.iter() {
            let Some(entry) = DictRef::from_value(entry) else {
                continue;
            };
            if let Some(install_dir) = entry.get_str("install_dir").and_then(|v| v.unpack_str()) {
                paths.push(
                    Path::new(install_dir)
                        .join("lib")
                        .join("pkgconfig")
                        .display()
                        .to_string(),
                );
            }
        }
        Ok(paths.join(sep))
    }

    /// Emit a pkg-config file; `name` and `version` are required, variables
    /// are written in `${}` reference order
    fn write_pc_file<'v>(
        path: &str,
        name: &str,
        version: &str,
        description: Option<&str>,
        cflags: Option<&str>,
        libs: Option<&str>,
        requires: Option<&str>,
        vars: Option<Value<'v>>,
    ) -> anyhow::Result<NoneType> {
        let vars: BTreeMap<String, String> = match vars {
            Some(vars) => string_map(vars, "write_pc_file vars")?.into_iter().collect(),
            None => BTreeMap::new(),
        };
        let pc = PcFile {
            name: name.to_string(),
            version: version.to_string(),
            description: description.map(str::to_string),
            cflags: cflags.map(str::to_string),
            libs: libs.map(str::to_string),
            requires: requires.map(str::to_string),
            vars,
        };
        let content = pc.emit().map_err(|e| anyhow::anyhow!(e))?;
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("write_pc_file: {path}: {e}"))?;
        Ok(NoneType)
    }

    /// Join path segments
    fn path(a: &str, b: &str, c: Option<&str>, d: Option<&str>) -> anyhow::Result<String> {
        let mut joined = Path::new(a).join(b);
        if let Some(c) = c {
            joined = joined.join(c);
        }
        if let Some(d) = d {
            joined = joined.join(d);
        }
        Ok(joined.display().to_string())
    }

    fn base_name(p: &str) -> anyhow::Result<String> {
        Ok(Path::new(p)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    fn dir_name(p: &str) -> anyhow::Result<String> {
        Ok(Path::new(p)
            .parent()
            .map(|n| n.display().to_string())
            .unwrap_or_default())
    }

    fn from_dir(dir: &str, rel: &str) -> anyhow::Result<String> {
        Ok(Path::new(dir).join(rel).display().to_string())
    }

    /// The recipe's current working directory
    fn cwd<'v>(eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<String> {
        Ok(runtime(eval)?.cwd().display().to_string())
    }

    /// Change the recipe's working directory
    fn chdir<'v>(dir: &str, eval: &mut Evaluator<'v, '_, '_>) -> anyhow::Result<NoneType> {
        let runtime = runtime(eval)?;
        let current = runtime.cwd();
        runtime.set_cwd(current.join(dir));
        Ok(NoneType)
    }
}
