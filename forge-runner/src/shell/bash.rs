//! Bash script generator

use std::path::Path;

use anyhow::Context;

use super::{ArchiveOptions, ScriptContext, ScriptGenerator, ShellOptions};

/// Generates POSIX-ish bash scripts for job execution
#[derive(Debug, Default)]
pub struct BashGenerator;

impl BashGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptGenerator for BashGenerator {
    fn shell(&self) -> &str {
        "bash"
    }

    fn generate(&self, ctx: &ScriptContext<'_>) -> anyhow::Result<String> {
        let job = ctx.job;
        let options = ShellOptions::from_job(job);

        let project_dir = ctx.builds_dir.join(project_dir_name(job));
        let project_dir = project_dir
            .to_str()
            .context("builds directory is not valid UTF-8")?
            .to_string();

        let mut w = ScriptWriter::new();
        w.line("#!/usr/bin/env bash");
        w.line("set -eo pipefail");
        w.empty_line();

        write_exports(&mut w, ctx);
        write_tls_ca(&mut w, ctx, &project_dir);
        write_sources(&mut w, ctx, &project_dir);
        write_cache_extractor(&mut w, ctx, &options);
        write_dependency_artifacts(&mut w, ctx, &options);
        write_commands(&mut w, ctx, &project_dir);
        write_cache_archiver(&mut w, ctx, &options);
        write_artifacts_uploader(&mut w, ctx, &options);

        Ok(w.finish())
    }
}

fn project_dir_name(job: &forge_core::domain::job::JobDescriptor) -> String {
    if job.name.is_empty() {
        format!("job-{}", job.id)
    } else {
        job.name.replace(['/', ' '], "-")
    }
}

fn write_exports(w: &mut ScriptWriter, ctx: &ScriptContext<'_>) {
    for variable in &ctx.job.variables {
        w.variable(&variable.key, &variable.value);
    }
}

fn write_tls_ca(w: &mut ScriptWriter, ctx: &ScriptContext<'_>, project_dir: &str) {
    let Some(chain) = &ctx.job.tls_ca_chain else {
        return;
    };
    let ca_file = format!("{project_dir}.ca.crt");
    w.notice("Installing TLS trust chain...");
    w.line(format!(
        "printf '%s\\n' {} > {}",
        quote(chain),
        quote(&ca_file)
    ));
    w.variable("GIT_SSL_CAINFO", &ca_file);
    w.variable("FORGE_SERVER_TLS_CA_FILE", &ca_file);
}

fn write_sources(w: &mut ScriptWriter, ctx: &ScriptContext<'_>, project_dir: &str) {
    let job = ctx.job;
    let git_dir = format!("{project_dir}/.git");

    if job.allow_git_fetch {
        w.if_directory(&git_dir);
        w.notice("Fetching changes...");
        w.cd(project_dir);
        w.command("git", &["clean", "-ffdx"]);
        w.command("git", &["reset", "--hard"]);
        w.command("git", &["remote", "set-url", "origin", &job.repo_url]);
        w.command(
            "git",
            &[
                "fetch",
                "origin",
                "--prune",
                "+refs/heads/*:refs/remotes/origin/*",
                "+refs/tags/*:refs/tags/*",
            ],
        );
        w.else_();
        write_clone(w, ctx, project_dir);
        w.end_if();
    } else {
        write_clone(w, ctx, project_dir);
    }

    // the sha is coordinator-supplied; never byte-slice it blindly
    let short_sha = job.sha.get(..8).unwrap_or(&job.sha);
    w.notice(&format!(
        "Checking out {} as {}...",
        short_sha, job.ref_name
    ));
    // leftover lock from a previously terminated checkout
    w.rm_file(".git/index.lock");
    w.command("git", &["checkout", "-q", &job.sha]);
}

fn write_clone(w: &mut ScriptWriter, ctx: &ScriptContext<'_>, project_dir: &str) {
    w.notice("Cloning repository...");
    w.rm_dir(project_dir);
    w.command("git", &["clone", &ctx.job.repo_url, project_dir]);
    w.cd(project_dir);
}

fn cache_file(ctx: &ScriptContext<'_>, options: &ArchiveOptions) -> Option<(String, String)> {
    let cache_dir = ctx.cache_dir?;
    let key = options
        .key
        .clone()
        .unwrap_or_else(|| format!("{}/{}", ctx.job.name, ctx.job.ref_name));
    if key.is_empty() {
        return None;
    }
    let file = cache_dir.join(&key).join("cache.zip");
    Some((key, file.to_string_lossy().into_owned()))
}

fn write_cache_extractor(w: &mut ScriptWriter, ctx: &ScriptContext<'_>, options: &ShellOptions) {
    let Some(cache) = &options.cache else { return };
    let Some(helper) = &ctx.capabilities.helper_command else {
        w.warning("The cache is not supported in this executor.");
        return;
    };
    if cache.command_arguments().is_empty() {
        return;
    }
    let Some((key, file)) = cache_file(ctx, cache) else {
        return;
    };

    w.notice(&format!("Checking cache for {key}..."));
    w.command(helper, &["cache-extractor", "--file", &file]);
}

fn write_dependency_artifacts(
    w: &mut ScriptWriter,
    ctx: &ScriptContext<'_>,
    options: &ShellOptions,
) {
    let deps: Vec<_> = ctx
        .job
        .depends_on
        .iter()
        .filter(|dep| dep.artifacts_file.is_some())
        .filter(|dep| options.is_dependent(&dep.name))
        .collect();
    if deps.is_empty() {
        return;
    }

    let Some(helper) = &ctx.capabilities.helper_command else {
        w.warning("The artifacts downloading is not supported in this executor.");
        return;
    };

    for dep in deps {
        w.notice(&format!(
            "Downloading artifacts for {} ({})...",
            dep.name, dep.id
        ));
        w.command(
            helper,
            &[
                "artifacts-downloader",
                "--url",
                &ctx.credentials.url,
                "--token",
                &dep.token,
                "--id",
                &dep.id.to_string(),
            ],
        );
    }
}

fn write_commands(w: &mut ScriptWriter, ctx: &ScriptContext<'_>, project_dir: &str) {
    w.cd(project_dir);
    for command in ctx.job.commands.trim().lines() {
        let command = command.trim();
        if command.is_empty() {
            w.empty_line();
            continue;
        }
        w.notice(&format!("$ {command}"));
        w.line(command);
    }
}

fn write_cache_archiver(w: &mut ScriptWriter, ctx: &ScriptContext<'_>, options: &ShellOptions) {
    let Some(cache) = &options.cache else { return };
    let Some(helper) = &ctx.capabilities.helper_command else {
        w.warning("The cache is not supported in this executor.");
        return;
    };
    let archiver_args = cache.command_arguments();
    if archiver_args.is_empty() {
        return;
    }
    let Some((key, file)) = cache_file(ctx, cache) else {
        return;
    };

    let mut args = vec![
        "cache-archiver".to_string(),
        "--file".to_string(),
        file,
    ];
    args.extend(archiver_args);

    w.notice(&format!("Creating cache {key}..."));
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    w.command(helper, &arg_refs);
}

fn write_artifacts_uploader(w: &mut ScriptWriter, ctx: &ScriptContext<'_>, options: &ShellOptions) {
    let Some(artifacts) = &options.artifacts else {
        return;
    };
    let Some(helper) = &ctx.capabilities.helper_command else {
        w.warning("The artifacts uploading is not supported in this executor.");
        return;
    };
    let archiver_args = artifacts.command_arguments();
    if archiver_args.is_empty() {
        return;
    }

    let mut args = vec![
        "artifacts-uploader".to_string(),
        "--url".to_string(),
        ctx.credentials.url.clone(),
        "--token".to_string(),
        ctx.credentials.token.clone(),
        "--id".to_string(),
        ctx.credentials.job_id.to_string(),
    ];
    args.extend(archiver_args);
    if let Some(name) = &artifacts.key {
        args.push("--name".to_string());
        args.push(name.clone());
    }

    w.notice("Uploading artifacts...");
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    w.command(helper, &arg_refs);
}

/// Line-oriented bash writer
struct ScriptWriter {
    script: String,
}

impl ScriptWriter {
    fn new() -> Self {
        Self {
            script: String::new(),
        }
    }

    fn line(&mut self, line: impl AsRef<str>) {
        self.script.push_str(line.as_ref());
        self.script.push('\n');
    }

    fn empty_line(&mut self) {
        self.script.push('\n');
    }

    fn notice(&mut self, message: &str) {
        self.line(format!("echo {}", quote(message)));
    }

    fn warning(&mut self, message: &str) {
        self.line(format!("echo {} >&2", quote(&format!("WARNING: {message}"))));
    }

    fn command(&mut self, program: &str, args: &[&str]) {
        let mut line = quote(program);
        for arg in args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        self.line(line);
    }

    fn variable(&mut self, key: &str, value: &str) {
        self.line(format!("export {}={}", key, quote(value)));
    }

    fn cd(&mut self, dir: &str) {
        self.command("cd", &[dir]);
    }

    fn rm_dir(&mut self, dir: &str) {
        self.command("rm", &["-rf", dir]);
    }

    fn rm_file(&mut self, file: &str) {
        self.command("rm", &["-f", file]);
    }

    fn if_directory(&mut self, dir: &str) {
        self.line(format!("if [ -d {} ]; then", quote(dir)));
    }

    fn else_(&mut self) {
        self.line("else");
    }

    fn end_if(&mut self) {
        self.line("fi");
    }

    fn finish(self) -> String {
        self.script
    }
}

/// Single-quote shell escaping
fn quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+@".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}
