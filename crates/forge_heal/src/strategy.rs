//! Repair strategies and their lookup by failure kind.

use async_trait::async_trait;
use forge_generate::{collect_artifact, GenerationClient};
use forge_runtime::ExecOutput;
use forge_sandbox::EnvironmentManager;
use regex::Regex;
use tracing::{debug, info};

use crate::classifier::{FailureKind, FailureRecord};
use crate::config::HealingConfig;
use crate::error::HealResult;
use crate::ledger::RepairOutcome;

/// Packages installed regardless of name length.
const KNOWN_PACKAGES: &[&str] = &[
    "react",
    "vue",
    "angular",
    "express",
    "lodash",
    "moment",
    "axios",
    "jquery",
    "bootstrap",
    "tailwindcss",
    "typescript",
];

const HEREDOC_MARKER: &str = "FORGE_EOF";

/// What a strategy may act on.
pub struct RepairContext<'a> {
    pub environment_id: &'a str,
    pub sandbox: &'a EnvironmentManager,
    pub generator: &'a dyn GenerationClient,
    pub config: &'a HealingConfig,
}

impl RepairContext<'_> {
    async fn exec(&self, command: &str) -> HealResult<ExecOutput> {
        Ok(self.sandbox.execute(self.environment_id, command).await?)
    }
}

/// A remediation for one failure kind.
#[async_trait]
pub trait RepairStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt a repair. Unsuccessful repairs are reported in the outcome;
    /// errors mean the environment could not be acted on at all.
    async fn attempt(&self, ctx: &RepairContext<'_>, record: &FailureRecord)
        -> HealResult<RepairOutcome>;
}

/// Installs a missing package, or looks for the module on disk.
pub struct InstallStrategy;

impl InstallStrategy {
    fn module_name(record: &FailureRecord) -> Option<String> {
        if let Some(name) = record.captures.first() {
            return Some(name.clone());
        }
        Regex::new(r"module named '(\w+)'")
            .ok()?
            .captures(&record.line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn is_package(name: &str) -> bool {
        KNOWN_PACKAGES.contains(&name.to_lowercase().as_str()) || name.len() > 3
    }

    async fn locate_module(&self, ctx: &RepairContext<'_>, name: &str) -> HealResult<RepairOutcome> {
        let command = format!(
            "find . -path ./node_modules -prune -o -type f -name '{}.*' -print | head -1",
            name
        );
        let output = ctx.exec(&command).await?;
        let found = output.stdout.trim();
        if output.succeeded() && !found.is_empty() {
            // The module exists locally; the import path itself needs a rewrite.
            Ok(RepairOutcome::failure(
                format!("import_path_candidate_{}", name),
                found.to_string(),
            ))
        } else {
            Ok(RepairOutcome::unresolved("import_path_not_found"))
        }
    }
}

#[async_trait]
impl RepairStrategy for InstallStrategy {
    fn name(&self) -> &'static str {
        "install"
    }

    async fn attempt(&self, ctx: &RepairContext<'_>, record: &FailureRecord) -> HealResult<RepairOutcome> {
        let Some(name) = Self::module_name(record) else {
            return Ok(RepairOutcome::unresolved("could_not_parse"));
        };
        if !Self::is_package(&name) {
            return self.locate_module(ctx, &name).await;
        }

        info!(environment_id = %ctx.environment_id, package = %name, "Installing missing package");
        let output = ctx
            .exec(&format!("{} {}", ctx.config.commands.install, name))
            .await?;
        if output.succeeded() {
            Ok(RepairOutcome::success(format!("installed_package_{}", name), output.stdout))
        } else {
            Ok(RepairOutcome::failure(format!("failed_to_install_{}", name), output.stderr))
        }
    }
}

/// Asks the generator to rewrite a representative source file.
pub struct RewriteStrategy;

impl RewriteStrategy {
    fn labels(kind: FailureKind) -> (&'static str, &'static str) {
        match kind {
            FailureKind::Syntax => ("fixed_syntax_error", "could_not_fix_syntax"),
            FailureKind::Type => ("fixed_type_error", "could_not_fix_type"),
            _ => ("ai_fixed_error", "ai_could_not_fix"),
        }
    }

    /// First source file outside `node_modules`.
    async fn source_file(&self, ctx: &RepairContext<'_>) -> HealResult<Option<String>> {
        let names = ctx
            .config
            .source_patterns
            .iter()
            .map(|pattern| format!("-name '{}'", pattern))
            .collect::<Vec<_>>()
            .join(" -o ");
        let command = format!(
            "find . -path ./node_modules -prune -o -type f \\( {} \\) -print | head -1",
            names
        );
        let output = ctx.exec(&command).await?;
        let path = output.stdout.lines().next().unwrap_or("").trim().to_string();
        Ok((output.succeeded() && !path.is_empty()).then_some(path))
    }
}

#[async_trait]
impl RepairStrategy for RewriteStrategy {
    fn name(&self) -> &'static str {
        "rewrite"
    }

    async fn attempt(&self, ctx: &RepairContext<'_>, record: &FailureRecord) -> HealResult<RepairOutcome> {
        let (fixed_label, unresolved_label) = Self::labels(record.kind);

        let Some(path) = self.source_file(ctx).await? else {
            return Ok(RepairOutcome::unresolved("file_not_found"));
        };
        let read = ctx.exec(&format!("cat {}", shell_quote(&path))).await?;
        if !read.succeeded() || read.stdout.trim().is_empty() {
            return Ok(RepairOutcome::unresolved("file_not_found"));
        }
        let original = read.stdout;

        debug!(environment_id = %ctx.environment_id, file = %path, "Requesting rewrite");
        let context = serde_json::json!({ "file": path, "kind": record.kind.name() });
        let response = collect_artifact(ctx.generator.generate(
            &fix_prompt(&original, &record.line),
            &context,
            false,
        ))
        .await?;

        let fixed = extract_code(&response);
        if fixed.trim().is_empty() || fixed.trim() == original.trim() {
            return Ok(RepairOutcome::failure(
                unresolved_label,
                "generator returned no change",
            ));
        }

        let write = ctx
            .exec(&format!(
                "cat > {} << '{marker}'\n{}\n{marker}",
                shell_quote(&path),
                fixed.trim_end(),
                marker = HEREDOC_MARKER
            ))
            .await?;
        if !write.succeeded() {
            return Ok(RepairOutcome::failure("write_failed", write.stderr));
        }

        info!(environment_id = %ctx.environment_id, file = %path, "Fixed code written");
        Ok(RepairOutcome::success(fixed_label, format!("rewrote {}", path)))
    }
}

/// Rebuilds the project, reinstalling dependencies if that fails.
pub struct RebuildStrategy;

#[async_trait]
impl RepairStrategy for RebuildStrategy {
    fn name(&self) -> &'static str {
        "rebuild"
    }

    async fn attempt(&self, ctx: &RepairContext<'_>, _record: &FailureRecord) -> HealResult<RepairOutcome> {
        let build = ctx.exec(&ctx.config.commands.rebuild).await?;
        if build.succeeded() {
            return Ok(RepairOutcome::success("rebuild_successful", "Project rebuilt successfully"));
        }

        let install = ctx.exec(&ctx.config.commands.reinstall).await?;
        if install.succeeded() {
            Ok(RepairOutcome::success("reinstalled_dependencies", "Dependencies reinstalled"))
        } else {
            Ok(RepairOutcome::failure("build_failed", build.stderr))
        }
    }
}

/// Runs the lint auto-fixer, then the formatter.
pub struct FormatStrategy;

#[async_trait]
impl RepairStrategy for FormatStrategy {
    fn name(&self) -> &'static str {
        "format"
    }

    async fn attempt(&self, ctx: &RepairContext<'_>, _record: &FailureRecord) -> HealResult<RepairOutcome> {
        let lint = ctx.exec(&ctx.config.commands.lint_fix).await?;
        if lint.succeeded() {
            return Ok(RepairOutcome::success("lint_fixed", "Linting errors fixed automatically"));
        }

        let format = ctx.exec(&ctx.config.commands.format).await?;
        if format.succeeded() {
            Ok(RepairOutcome::success("prettier_fixed", "Code formatted"))
        } else {
            Ok(RepairOutcome::failure("lint_failed", lint.stderr))
        }
    }
}

/// Fixed mapping from failure kind to strategy.
pub struct StrategyTable {
    install: InstallStrategy,
    rewrite: RewriteStrategy,
    rebuild: RebuildStrategy,
    format: FormatStrategy,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            install: InstallStrategy,
            rewrite: RewriteStrategy,
            rebuild: RebuildStrategy,
            format: FormatStrategy,
        }
    }
}

impl StrategyTable {
    pub fn for_kind(&self, kind: FailureKind) -> &dyn RepairStrategy {
        match kind {
            FailureKind::Import => &self.install,
            FailureKind::Build => &self.rebuild,
            FailureKind::Lint => &self.format,
            FailureKind::Syntax
            | FailureKind::Type
            | FailureKind::Runtime
            | FailureKind::Test
            | FailureKind::Unknown => &self.rewrite,
        }
    }
}

fn fix_prompt(code: &str, error: &str) -> String {
    format!(
        "You are an expert debugger. Fix code errors while maintaining functionality and best practices.

Fix the following code error:

Code:
```typescript
{}
```

Error:
{}

Requirements:
1. Fix the specific error
2. Maintain code functionality
3. Follow best practices
4. Add error handling if needed
5. Ensure the fix is minimal and targeted

Provide the corrected code.",
        code, error
    )
}

/// Body of the first fenced code block, or the whole text if there is none.
pub fn extract_code(response: &str) -> String {
    Regex::new(r"(?s)```[\w+.-]*[ \t]*\r?\n(.*?)```")
        .ok()
        .and_then(|re| re.captures(response))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| response.to_string())
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
