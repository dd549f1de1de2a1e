//! Command lines for the build tool and the embedded runtime.

use crate::build::{BuildContext, TargetDescriptor};
use std::path::PathBuf;

/// Positional target passed to khamake when the build should also run the app.
pub const RUN_FLAG: &str = "--run";

/// What a compile invocation is for.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Target being compiled
    pub target: TargetDescriptor,
    /// Compiling for the host's viewport
    pub in_viewport: bool,
    /// Compiling a publish build
    pub is_publish: bool,
    /// Compiling for play (native play passes `--run`)
    pub is_play: bool,
    /// World shader defines include `_VR`
    pub vr: bool,
    /// Reuse the compiled bundle and only refresh assets
    pub patch: bool,
}

impl CompileRequest {
    /// Create a request for `target`.
    pub fn new(target: TargetDescriptor) -> Self {
        Self { target, in_viewport: false, is_publish: false, is_play: false, vr: false, patch: false }
    }

    /// Set viewport mode.
    pub fn with_viewport(mut self, in_viewport: bool) -> Self {
        self.in_viewport = in_viewport;
        self
    }

    /// Set publish mode.
    pub fn with_publish(mut self, is_publish: bool) -> Self {
        self.is_publish = is_publish;
        self
    }

    /// Set play mode.
    pub fn with_play(mut self, is_play: bool) -> Self {
        self.is_play = is_play;
        self
    }

    /// Set whether VR output is requested.
    pub fn with_vr(mut self, vr: bool) -> Self {
        self.vr = vr;
        self
    }

    /// Set patch mode.
    pub fn with_patch(mut self, patch: bool) -> Self {
        self.patch = patch;
        self
    }
}

/// Build the khamake command line.
///
/// `node <khamake> [target] [--ffmpeg <path>] -g <gapi> [--shaderversion N]
/// [--vr webvr] --to <outDir> [extra...] [--nohaxe --noproject]`
pub fn compile_argv(ctx: &BuildContext, request: &CompileRequest) -> Vec<String> {
    let config = ctx.config();
    let mut argv = vec![
        config.toolchain.node.to_string_lossy().into_owned(),
        ctx.khamake_path().to_string_lossy().into_owned(),
    ];

    let positional = if request.is_play && request.target == TargetDescriptor::native() {
        RUN_FLAG
    } else {
        request.target.kha_target()
    };
    if !positional.is_empty() {
        argv.push(positional.to_string());
    }

    if let Some(ffmpeg) = &config.toolchain.ffmpeg {
        argv.push("--ffmpeg".to_string());
        argv.push(ctx.resolve_path(ffmpeg).to_string_lossy().into_owned());
    }

    argv.push("-g".to_string());
    argv.push(config.runtime.gapi.clone());

    if config.runtime.legacy_shaders && !request.in_viewport {
        argv.push("--shaderversion".to_string());
        argv.push("110".to_string());
    } else if !request.target.is_mobile() {
        argv.push("--shaderversion".to_string());
        argv.push("330".to_string());
    }

    if request.vr {
        argv.push("--vr".to_string());
        argv.push("webvr".to_string());
    }

    argv.push("--to".to_string());
    let out_dir = ctx.compile_output_dir(&request.target, request.in_viewport, request.is_publish);
    argv.push(out_dir.to_string_lossy().into_owned());

    argv.extend(config.toolchain.extra_args.iter().filter(|a| !a.is_empty()).cloned());

    if request.patch {
        argv.push("--nohaxe".to_string());
        argv.push("--noproject".to_string());
    }

    argv
}

/// Command line and working directory for the embedded runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    /// Runtime binary followed by its arguments
    pub argv: Vec<String>,
    /// Working directory (the binary's directory)
    pub cwd: Option<PathBuf>,
}

/// Build the Krom command line for debug play.
pub fn krom_run_command(ctx: &BuildContext) -> RunCommand {
    let binary = ctx.krom_path();
    let debug = ctx.build_dir().join("debug");

    let mut argv = vec![
        binary.to_string_lossy().into_owned(),
        debug.join("krom").to_string_lossy().into_owned(),
        debug.join("krom-resources").to_string_lossy().into_owned(),
    ];
    if ctx.krom_nosound() {
        argv.push("--nosound".to_string());
    }
    argv.push("--stdout".to_string());
    argv.push(ctx.krom_stdout().to_string_lossy().into_owned());

    RunCommand { argv, cwd: binary.parent().map(|p| p.to_path_buf()) }
}

/// Build the minifier command line for a JS bundle (minified in place).
pub fn minify_argv(ctx: &BuildContext, js_file: &std::path::Path) -> Vec<String> {
    let js = js_file.to_string_lossy().into_owned();
    vec![
        ctx.config().toolchain.node.to_string_lossy().into_owned(),
        ctx.minifier_path().to_string_lossy().into_owned(),
        js.clone(),
        "-o".to_string(),
        js,
    ]
}
