//! Build driver
//!
//! Drives the two external stages (configure, build) for one build layout
//! through a strict state machine:
//!
//! ```text
//! Idle -> Configuring -> Configured -> Building -> Succeeded
//!              |                          |
//!              +--------> Failed <--------+
//! ```
//!
//! Operations invoked from the wrong state fail with
//! [`BuildError::Sequence`] before any process is started. There is no
//! automatic retry; `Failed` and `Succeeded` are terminal.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::defaults;
use crate::core::layout::BuildLayout;
use crate::core::settings::Settings;
use crate::error::{BuildError, Stage};
use crate::infra::process::{self, LineSink, ProcessSpec, Termination};

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildState {
    /// Nothing has run yet
    Idle,
    /// Configure stage is running
    Configuring,
    /// Configure stage succeeded
    Configured,
    /// Build stage is running
    Building,
    /// Build stage succeeded
    Succeeded,
    /// A stage or hook failed
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::Configured => "configured",
            Self::Building => "building",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-stage time limits; `None` means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    /// Configure stage limit
    pub configure: Option<Duration>,
    /// Build stage limit
    pub build: Option<Duration>,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            configure: defaults::CONFIGURE_TIMEOUT_SECS.map(Duration::from_secs),
            build: defaults::BUILD_TIMEOUT_SECS.map(Duration::from_secs),
        }
    }
}

impl StageTimeouts {
    fn for_stage(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::Configure => self.configure,
            Stage::Build => self.build,
        }
    }
}

/// Information passed to hooks
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// Stage the hook surrounds
    pub stage: Stage,
    /// Build layout
    pub layout: &'a BuildLayout,
    /// Active profile
    pub settings: &'a Settings,
}

/// Hook callback; an `Err` fails the driver
pub type Hook = Box<dyn Fn(&HookContext<'_>) -> Result<(), String> + Send + Sync>;

/// Optional callbacks around the stages
#[derive(Default)]
pub struct BuildHooks {
    pre_configure: Option<Hook>,
    post_build: Option<Hook>,
}

impl fmt::Debug for BuildHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildHooks")
            .field("pre_configure", &self.pre_configure.is_some())
            .field("post_build", &self.post_build.is_some())
            .finish()
    }
}

impl BuildHooks {
    /// Run `hook` before the configure command
    #[must_use]
    pub fn pre_configure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.pre_configure = Some(Box::new(hook));
        self
    }

    /// Run `hook` after a successful build command
    #[must_use]
    pub fn post_build<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.post_build = Some(Box::new(hook));
        self
    }
}

/// Inputs available to a build tool when producing stage commands
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    /// Build layout
    pub layout: &'a BuildLayout,
    /// Active profile
    pub settings: &'a Settings,
}

/// Produces the external commands for each stage
pub trait BuildTool: Send + Sync {
    /// Tool name for logs
    fn name(&self) -> &str;

    /// Configure stage command
    fn configure_command(&self, ctx: &ToolContext<'_>) -> ProcessSpec;

    /// Build stage command
    fn build_command(&self, ctx: &ToolContext<'_>) -> ProcessSpec;
}

/// CMake as the external build-file generator and builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMakeTool {
    program: PathBuf,
    jobs: usize,
    configure_args: Vec<String>,
}

impl CMakeTool {
    /// Use `program` as the cmake executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            jobs: num_cpus::get(),
            configure_args: Vec::new(),
        }
    }

    /// Locate `cmake` on `PATH`
    pub fn locate() -> Option<Self> {
        which::which("cmake").ok().map(Self::new)
    }

    /// Parallel build jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Extra `-D...` arguments for the configure stage
    #[must_use]
    pub fn with_configure_args(mut self, args: Vec<String>) -> Self {
        self.configure_args = args;
        self
    }
}

impl BuildTool for CMakeTool {
    fn name(&self) -> &str {
        "cmake"
    }

    fn configure_command(&self, ctx: &ToolContext<'_>) -> ProcessSpec {
        let toolchain = ctx.layout.generators_dir().join("kiln_toolchain.cmake");
        ProcessSpec::new(&self.program)
            .arg("-S")
            .arg(ctx.layout.project_dir().display().to_string())
            .arg("-B")
            .arg(ctx.layout.build_dir().display().to_string())
            .arg(format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain.display()))
            .arg(format!("-DCMAKE_BUILD_TYPE={}", ctx.settings.build_type()))
            .args(self.configure_args.iter().cloned())
            .current_dir(ctx.layout.project_dir())
    }

    fn build_command(&self, ctx: &ToolContext<'_>) -> ProcessSpec {
        ProcessSpec::new(&self.program)
            .arg("--build")
            .arg(ctx.layout.build_dir().display().to_string())
            .arg("--config")
            .arg(ctx.settings.build_type())
            .arg("--parallel")
            .arg(self.jobs.to_string())
            .current_dir(ctx.layout.project_dir())
    }
}

/// Explicit argv commands run inside the build directory
///
/// The commands see `KILN_SOURCE_DIR`, `KILN_BUILD_DIR`,
/// `KILN_GENERATORS_DIR` and `KILN_BUILD_TYPE` in their environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTool {
    configure: Vec<String>,
    build: Vec<String>,
}

impl CommandTool {
    /// Create a tool from configure and build argv vectors
    pub fn new(configure: Vec<String>, build: Vec<String>) -> Self {
        Self { configure, build }
    }

    fn spec(argv: &[String], ctx: &ToolContext<'_>) -> ProcessSpec {
        let (program, args) = argv.split_first().map_or(("", &[][..]), |(p, a)| (p.as_str(), a));
        ProcessSpec::new(program)
            .args(args.iter().cloned())
            .current_dir(ctx.layout.build_dir())
            .env(
                "KILN_SOURCE_DIR",
                ctx.layout.project_dir().display().to_string(),
            )
            .env("KILN_BUILD_DIR", ctx.layout.build_dir().display().to_string())
            .env(
                "KILN_GENERATORS_DIR",
                ctx.layout.generators_dir().display().to_string(),
            )
            .env("KILN_BUILD_TYPE", ctx.settings.build_type())
    }
}

impl BuildTool for CommandTool {
    fn name(&self) -> &str {
        "command"
    }

    fn configure_command(&self, ctx: &ToolContext<'_>) -> ProcessSpec {
        Self::spec(&self.configure, ctx)
    }

    fn build_command(&self, ctx: &ToolContext<'_>) -> ProcessSpec {
        Self::spec(&self.build, ctx)
    }
}

/// State machine over one layout's configure and build stages
pub struct BuildDriver {
    tool: Box<dyn BuildTool>,
    layout: BuildLayout,
    settings: Settings,
    hooks: BuildHooks,
    timeouts: StageTimeouts,
    cancel: CancellationToken,
    sink: Option<LineSink>,
    state: BuildState,
    history: Vec<BuildState>,
}

impl fmt::Debug for BuildDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildDriver")
            .field("tool", &self.tool.name())
            .field("layout", &self.layout)
            .field("state", &self.state)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl BuildDriver {
    /// Create an idle driver
    pub fn new(tool: impl BuildTool + 'static, layout: BuildLayout, settings: Settings) -> Self {
        Self::from_boxed(Box::new(tool), layout, settings)
    }

    /// Create an idle driver around an already boxed tool
    pub fn from_boxed(tool: Box<dyn BuildTool>, layout: BuildLayout, settings: Settings) -> Self {
        Self {
            tool,
            layout,
            settings,
            hooks: BuildHooks::default(),
            timeouts: StageTimeouts::default(),
            cancel: CancellationToken::new(),
            sink: None,
            state: BuildState::Idle,
            history: vec![BuildState::Idle],
        }
    }

    /// Install stage hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: BuildHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set per-stage timeouts
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Use an external cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Forward every output line to `sink`
    #[must_use]
    pub fn with_output_sink(mut self, sink: LineSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Current state
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Every state visited, starting with `Idle`
    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    /// Token that cancels the running stage
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Layout the driver works in
    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Run the configure stage
    pub async fn configure(&mut self) -> Result<(), BuildError> {
        self.require(BuildState::Idle, "configure")?;
        self.transition(BuildState::Configuring);

        if let Err(e) = self.run_hook(Stage::Configure, "pre-configure") {
            self.transition(BuildState::Failed);
            return Err(e);
        }

        match self.run_stage(Stage::Configure).await {
            Ok(()) => {
                self.transition(BuildState::Configured);
                Ok(())
            }
            Err(e) => {
                self.transition(BuildState::Failed);
                Err(e)
            }
        }
    }

    /// Run the build stage
    pub async fn build(&mut self) -> Result<(), BuildError> {
        self.require(BuildState::Configured, "build")?;
        self.transition(BuildState::Building);

        let result = match self.run_stage(Stage::Build).await {
            Ok(()) => self.run_hook(Stage::Build, "post-build"),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.transition(BuildState::Succeeded);
                Ok(())
            }
            Err(e) => {
                self.transition(BuildState::Failed);
                Err(e)
            }
        }
    }

    /// Configure, then build
    pub async fn run(&mut self) -> Result<(), BuildError> {
        self.configure().await?;
        self.build().await
    }

    fn require(&self, expected: BuildState, operation: &str) -> Result<(), BuildError> {
        if self.state == expected {
            return Ok(());
        }
        Err(BuildError::Sequence {
            operation: operation.to_string(),
            state: self.state.to_string(),
        })
    }

    fn transition(&mut self, next: BuildState) {
        tracing::debug!("Build driver: {} -> {next}", self.state);
        self.state = next;
        self.history.push(next);
    }

    fn run_hook(&self, stage: Stage, name: &str) -> Result<(), BuildError> {
        let hook = match stage {
            Stage::Configure => &self.hooks.pre_configure,
            Stage::Build => &self.hooks.post_build,
        };
        let Some(hook) = hook else {
            return Ok(());
        };

        let ctx = HookContext {
            stage,
            layout: &self.layout,
            settings: &self.settings,
        };
        hook(&ctx).map_err(|error| BuildError::Hook {
            hook: name.to_string(),
            error,
        })
    }

    async fn run_stage(&self, stage: Stage) -> Result<(), BuildError> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled { stage });
        }

        let ctx = ToolContext {
            layout: &self.layout,
            settings: &self.settings,
        };
        let spec = match stage {
            Stage::Configure => self.tool.configure_command(&ctx),
            Stage::Build => self.tool.build_command(&ctx),
        };
        let timeout = self.timeouts.for_stage(stage);

        let output = process::run(
            &spec,
            &stage.to_string(),
            timeout,
            &self.cancel,
            self.sink.clone(),
        )
        .await
        .map_err(|e| BuildError::Spawn {
            stage,
            program: spec.program.display().to_string(),
            error: e.to_string(),
        })?;

        match output.termination {
            Termination::Exited if output.success() => Ok(()),
            Termination::Exited => Err(match stage {
                Stage::Configure => BuildError::Configure {
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                },
                Stage::Build => BuildError::Build {
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                },
            }),
            Termination::TimedOut => Err(BuildError::Timeout {
                stage,
                timeout: timeout.unwrap_or_default(),
                stdout: output.stdout,
                stderr: output.stderr,
            }),
            Termination::Cancelled => Err(BuildError::Cancelled { stage }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::linux_release;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn driver(temp: &TempDir, configure: &str, build: &str) -> BuildDriver {
        let layout = BuildLayout::new(temp.path(), &linux_release());
        layout.create().unwrap();
        BuildDriver::new(
            CommandTool::new(sh(configure), sh(build)),
            layout,
            linux_release(),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_happy_path_history() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(&temp, "exit 0", "exit 0");

        driver.configure().await.unwrap();
        assert_eq!(driver.state(), BuildState::Configured);
        driver.build().await.unwrap();

        assert_eq!(
            driver.history(),
            [
                BuildState::Idle,
                BuildState::Configuring,
                BuildState::Configured,
                BuildState::Building,
                BuildState::Succeeded
            ]
        );
    }

    #[tokio::test]
    async fn test_build_before_configure_is_sequence_error() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(&temp, "exit 0", "touch built");

        let err = driver.build().await.unwrap_err();
        assert_eq!(
            err,
            BuildError::Sequence {
                operation: "build".into(),
                state: "idle".into()
            }
        );
        assert_eq!(driver.state(), BuildState::Idle);
        assert_eq!(driver.history(), [BuildState::Idle]);
        assert!(!driver.layout().build_dir().join("built").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configure_twice_is_sequence_error() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(&temp, "exit 0", "exit 0");

        driver.configure().await.unwrap();
        let err = driver.configure().await.unwrap_err();
        assert!(matches!(err, BuildError::Sequence { .. }));
        assert_eq!(driver.state(), BuildState::Configured);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configure_failure_is_terminal() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(&temp, "echo bad toolchain >&2; exit 2", "touch built");

        let err = driver.configure().await.unwrap_err();
        match err {
            BuildError::Configure {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(stderr, "bad toolchain\n");
            }
            other => panic!("Expected Configure, got {other:?}"),
        }
        assert_eq!(driver.state(), BuildState::Failed);

        let err = driver.build().await.unwrap_err();
        assert!(matches!(err, BuildError::Sequence { .. }));
        assert!(!driver.layout().build_dir().join("built").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_failure_carries_output() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(&temp, "exit 0", "echo compiling; exit 1");

        let err = driver.run().await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Build));
        assert!(matches!(err, BuildError::Build { exit_code: Some(1), ref stdout, .. } if stdout == "compiling\n"));
        assert_eq!(driver.state(), BuildState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commands_run_in_build_dir_with_env() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(
            &temp,
            "echo \"$KILN_BUILD_TYPE\" > configured.txt",
            "test -f configured.txt && touch built",
        );

        driver.run().await.unwrap();
        let build_dir = driver.layout().build_dir();
        assert_eq!(
            std::fs::read_to_string(build_dir.join("configured.txt")).unwrap(),
            "Release\n"
        );
        assert!(build_dir.join("built").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_timeout() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(&temp, "exit 0", "exec sleep 30").with_timeouts(StageTimeouts {
            configure: None,
            build: Some(Duration::from_millis(200)),
        });

        let err = driver.run().await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Timeout {
                stage: Stage::Build,
                ..
            }
        ));
        assert_eq!(driver.state(), BuildState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation() {
        let temp = TempDir::new().unwrap();
        let mut driver = driver(&temp, "exec sleep 30", "exit 0");
        let token = driver.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let err = driver.configure().await.unwrap_err();
        assert_eq!(
            err,
            BuildError::Cancelled {
                stage: Stage::Configure
            }
        );
        assert_eq!(driver.state(), BuildState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hooks_run_around_stages() {
        let temp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let pre = Arc::clone(&calls);
        let post = Arc::clone(&calls);

        let hooks = BuildHooks::default()
            .pre_configure(move |ctx| {
                assert_eq!(ctx.stage, Stage::Configure);
                pre.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .post_build(move |ctx| {
                assert!(ctx.layout.build_dir().join("built").exists());
                post.fetch_add(10, Ordering::SeqCst);
                Ok(())
            });

        let mut driver = driver(&temp, "exit 0", "touch built").with_hooks(hooks);
        driver.run().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_failing_pre_configure_hook_skips_command() {
        let temp = TempDir::new().unwrap();
        let hooks = BuildHooks::default().pre_configure(|_| Err("missing sdk".to_string()));
        let mut driver = driver(&temp, "touch configured", "exit 0").with_hooks(hooks);

        let err = driver.configure().await.unwrap_err();
        assert_eq!(
            err,
            BuildError::Hook {
                hook: "pre-configure".into(),
                error: "missing sdk".into()
            }
        );
        assert_eq!(driver.state(), BuildState::Failed);
        assert!(!driver.layout().build_dir().join("configured").exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let temp = TempDir::new().unwrap();
        let layout = BuildLayout::new(temp.path(), &linux_release());
        layout.create().unwrap();
        let mut driver = BuildDriver::new(
            CommandTool::new(vec!["kiln-no-such-tool".into()], Vec::new()),
            layout,
            linux_release(),
        );

        let err = driver.configure().await.unwrap_err();
        assert!(matches!(err, BuildError::Spawn { stage: Stage::Configure, .. }));
    }

    #[test]
    fn test_cmake_commands() {
        let layout = BuildLayout::new(Path::new("/src/app"), &linux_release());
        let settings = linux_release();
        let ctx = ToolContext {
            layout: &layout,
            settings: &settings,
        };
        let tool = CMakeTool::new("cmake").with_jobs(4);

        assert_eq!(
            tool.configure_command(&ctx).display(),
            "cmake -S /src/app -B /src/app/build/linux-x86_64-gcc-release \
             -DCMAKE_TOOLCHAIN_FILE=/src/app/build/linux-x86_64-gcc-release/generators/kiln_toolchain.cmake \
             -DCMAKE_BUILD_TYPE=Release"
        );
        assert_eq!(
            tool.build_command(&ctx).display(),
            "cmake --build /src/app/build/linux-x86_64-gcc-release --config Release --parallel 4"
        );
    }
}
