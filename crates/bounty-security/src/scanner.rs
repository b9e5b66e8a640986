//! Static scan of submitted diffs for high-risk constructs.
//!
//! Only added lines are matched against the pattern table; every touched
//! path (added, modified or deleted) is matched against the protected-path
//! list. Any finding vetoes the submission.

use bounty_types::ClaimantId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

const MAX_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    /// Arbitrary code or shell execution
    ExecutionSink,
    /// Hard-coded keys, tokens or private key material
    Credential,
    /// Code that moves funds directly
    PaymentPath,
    /// Change to a payment, security or authentication file
    ProtectedPath,
    /// Bounty on a restricted surface claimed by an external submitter
    RestrictedTask,
    /// Encoded or escaped payloads
    Obfuscation,
    /// Destructive shell or SQL commands
    Destructive,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskCategory::ExecutionSink => "execution_sink",
            RiskCategory::Credential => "credential",
            RiskCategory::PaymentPath => "payment_path",
            RiskCategory::ProtectedPath => "protected_path",
            RiskCategory::RestrictedTask => "restricted_task",
            RiskCategory::Obfuscation => "obfuscation",
            RiskCategory::Destructive => "destructive",
        };
        write!(f, "{}", name)
    }
}

struct RiskPattern {
    rule: &'static str,
    category: RiskCategory,
    regex: Regex,
}

impl RiskPattern {
    fn new(rule: &'static str, category: RiskCategory, pattern: &str) -> Self {
        Self {
            rule,
            category,
            regex: Regex::new(pattern).expect("invalid risk pattern"),
        }
    }
}

static RISK_PATTERNS: LazyLock<Vec<RiskPattern>> = LazyLock::new(|| {
    use RiskCategory::*;
    vec![
        RiskPattern::new("subprocess", ExecutionSink, r"(?i)\bsubprocess\."),
        RiskPattern::new("os_system", ExecutionSink, r"(?i)\bos\.system\b"),
        RiskPattern::new("eval_call", ExecutionSink, r"(?i)\beval\s*\("),
        RiskPattern::new("exec_call", ExecutionSink, r"(?i)\bexec\s*\("),
        RiskPattern::new("dynamic_import", ExecutionSink, r"__import__"),
        RiskPattern::new("popen", ExecutionSink, r"(?i)\bpopen\s*\("),
        RiskPattern::new("child_process", ExecutionSink, r"\bchild_process\b"),
        RiskPattern::new("process_command", ExecutionSink, r"\bprocess::Command\b"),
        RiskPattern::new("private_key_ref", Credential, r"(?i)\bprivate_key\b"),
        RiskPattern::new("secret_key_ref", Credential, r"(?i)\bsecret_key\b"),
        RiskPattern::new("keypair_from_bytes", Credential, r"(?i)Keypair\.from_bytes"),
        RiskPattern::new(
            "base58_private_decode",
            Credential,
            r"(?i)base58\.b58decode.*private",
        ),
        RiskPattern::new("github_token", Credential, r"gh[pousr]_[A-Za-z0-9_]{36,}"),
        RiskPattern::new("anthropic_api_key", Credential, r"sk-ant-[a-zA-Z0-9\-_]{20,}"),
        RiskPattern::new("openai_api_key", Credential, r"sk-[a-zA-Z0-9]{20,}"),
        RiskPattern::new(
            "generic_secret",
            Credential,
            r#"(?i)(secret|password|api[_-]?key)['"]?\s*[:=]\s*['"]([^\s'"]{8,})['"]"#,
        ),
        RiskPattern::new(
            "pem_private_key",
            Credential,
            r"-----BEGIN\s+(RSA\s+|EC\s+|OPENSSH\s+)?PRIVATE\s+KEY-----",
        ),
        RiskPattern::new(
            "base58_keypair",
            Credential,
            r"\b[1-9A-HJ-NP-Za-km-z]{86,88}\b",
        ),
        RiskPattern::new("send_sol", PaymentPath, r"(?i)\bsend_sol\b"),
        RiskPattern::new("transfer_sol", PaymentPath, r"(?i)\btransfer_sol\b"),
        RiskPattern::new("base64_decode", Obfuscation, r"(?i)\bb64decode\s*\("),
        RiskPattern::new("atob", Obfuscation, r"\batob\s*\("),
        RiskPattern::new("from_char_code", Obfuscation, r"String\.fromCharCode"),
        RiskPattern::new("hex_escapes", Obfuscation, r"(?:\\x[0-9a-fA-F]{2}){8,}"),
        RiskPattern::new("base64_blob", Obfuscation, r"[A-Za-z0-9+/]{160,}={0,2}"),
        RiskPattern::new("rm_rf", Destructive, r"(?i)\brm\s+-rf\b"),
        RiskPattern::new("drop_table", Destructive, r"(?i)\bDROP\s+TABLE\b"),
        RiskPattern::new("delete_from", Destructive, r"(?i)\bDELETE\s+FROM\b"),
        RiskPattern::new("truncate_table", Destructive, r"(?i)\bTRUNCATE\s+TABLE\b"),
    ]
});

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -\d+(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("invalid hunk pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: RiskCategory,
    pub rule: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub excerpt: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.rule)?;
        if let Some(file) = &self.file {
            write!(f, " in {}", file)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub files_touched: Vec<String>,
    pub lines_scanned: usize,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn summary(&self) -> String {
        self.findings
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Path fragments (case-insensitive) that only internal submitters may touch
    #[serde(default = "default_protected_paths")]
    pub protected_paths: Vec<String>,
    /// Task labels that exclude external submitters entirely
    #[serde(default = "default_restricted_labels")]
    pub restricted_labels: Vec<String>,
    /// Claimants exempt from the protected-path and restricted-label rules
    #[serde(default)]
    pub internal_submitters: Vec<ClaimantId>,
}

fn default_protected_paths() -> Vec<String> {
    [
        "settle",
        "payout",
        "payment",
        "escrow",
        "treasury",
        "wallet",
        "security",
        "auth",
        ".github/workflows",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_restricted_labels() -> Vec<String> {
    ["payment", "security", "auth"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            protected_paths: default_protected_paths(),
            restricted_labels: default_restricted_labels(),
            internal_submitters: Vec::new(),
        }
    }
}

/// Who submitted and what the task is about.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub submitter: &'a ClaimantId,
    pub task_labels: &'a [String],
}

struct AddedLine<'a> {
    file: Option<String>,
    line: Option<usize>,
    text: &'a str,
}

struct ParsedDiff<'a> {
    files: Vec<String>,
    added: Vec<AddedLine<'a>>,
}

fn strip_path_prefix(path: &str) -> Option<String> {
    let path = path.trim();
    if path == "/dev/null" {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}

fn touch(files: &mut Vec<String>, path: String) {
    if !files.contains(&path) {
        files.push(path);
    }
}

/// Extended header lines git writes between `diff --git` and the first hunk.
const METADATA_PREFIXES: &[&str] = &[
    "index ",
    "similarity index ",
    "dissimilarity index ",
    "new file mode ",
    "deleted file mode ",
    "old mode ",
    "new mode ",
    "Binary files ",
    "GIT binary patch",
];

/// Paths of a `diff --git a/X b/Y` header.
fn git_header_paths(rest: &str) -> Vec<String> {
    match rest.rfind(" b/") {
        Some(split) => [&rest[..split], &rest[split + 1..]]
            .into_iter()
            .filter_map(strip_path_prefix)
            .collect(),
        None => strip_path_prefix(rest).into_iter().collect(),
    }
}

/// Lines still owed by the current hunk, from its `@@ -a,b +c,d @@` header.
#[derive(Default)]
struct Hunk {
    old: usize,
    new: usize,
}

impl Hunk {
    fn is_open(&self) -> bool {
        self.old > 0 || self.new > 0
    }
}

fn parse_diff(diff: &str) -> ParsedDiff<'_> {
    let is_unified = diff
        .lines()
        .any(|l| l.starts_with("+++ ") || l.starts_with("diff --git ") || l.starts_with("@@ "));

    if !is_unified {
        // Raw content: every line counts as added
        return ParsedDiff {
            files: Vec::new(),
            added: diff
                .lines()
                .enumerate()
                .map(|(i, text)| AddedLine {
                    file: None,
                    line: Some(i + 1),
                    text,
                })
                .collect(),
        };
    }

    let mut files: Vec<String> = Vec::new();
    let mut added = Vec::new();
    let mut current: Option<String> = None;
    let mut next_line: Option<usize> = None;
    let mut hunk = Hunk::default();
    // A `+++ ` line is a header only right after `--- ` or before the file's first hunk
    let mut after_old_header = false;
    let mut seen_hunk = false;

    for raw in diff.lines() {
        if hunk.is_open() {
            if let Some(text) = raw.strip_prefix('+') {
                added.push(AddedLine {
                    file: current.clone(),
                    line: next_line,
                    text,
                });
                next_line = next_line.map(|n| n + 1);
                hunk.new = hunk.new.saturating_sub(1);
                continue;
            } else if raw.starts_with('-') {
                hunk.old = hunk.old.saturating_sub(1);
                continue;
            } else if raw.starts_with(' ') || raw.is_empty() {
                next_line = next_line.map(|n| n + 1);
                hunk.old = hunk.old.saturating_sub(1);
                hunk.new = hunk.new.saturating_sub(1);
                continue;
            } else if raw.starts_with('\\') {
                continue;
            }
            // Anything else ends a short hunk and is read as a header below
            hunk = Hunk::default();
        }

        let old_header = after_old_header;
        after_old_header = false;

        if let Some(rest) = raw.strip_prefix("diff --git ") {
            for path in git_header_paths(rest) {
                touch(&mut files, path);
            }
            current = None;
            next_line = None;
            seen_hunk = false;
        } else if let Some(rest) = raw.strip_prefix("--- ") {
            if let Some(path) = strip_path_prefix(rest) {
                touch(&mut files, path.clone());
                current = Some(path);
            }
            after_old_header = true;
            seen_hunk = false;
        } else if let Some(rest) = raw
            .strip_prefix("+++ ")
            .filter(|_| old_header || !seen_hunk)
        {
            if let Some(path) = strip_path_prefix(rest) {
                touch(&mut files, path.clone());
                current = Some(path);
            }
        } else if let Some(path) = ["rename from ", "rename to ", "copy from ", "copy to "]
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix))
        {
            touch(&mut files, path.trim().to_string());
        } else if let Some(caps) = HUNK_HEADER.captures(raw) {
            // An omitted count means one line
            let count = |i: usize| -> usize {
                match caps.get(i) {
                    Some(m) => m.as_str().parse().unwrap_or(0),
                    None => 1,
                }
            };
            hunk = Hunk {
                old: count(1),
                new: count(3),
            };
            next_line = caps.get(2).and_then(|m| m.as_str().parse().ok());
            seen_hunk = true;
        } else if !raw.starts_with('-') && !METADATA_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            // Stray content outside any hunk is scanned rather than trusted
            added.push(AddedLine {
                file: current.clone(),
                line: None,
                text: raw.strip_prefix('+').unwrap_or(raw),
            });
        }
    }

    ParsedDiff { files, added }
}

fn excerpt(text: &str) -> String {
    text.trim().chars().take(MAX_EXCERPT_CHARS).collect()
}

pub struct CodeScanner {
    config: ScannerConfig,
}

impl CodeScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn is_internal(&self, claimant: &ClaimantId) -> bool {
        self.config.internal_submitters.contains(claimant)
    }

    fn is_protected(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.config
            .protected_paths
            .iter()
            .any(|fragment| lower.contains(&fragment.to_lowercase()))
    }

    pub fn scan(&self, diff: &str, ctx: ScanContext<'_>) -> ScanReport {
        let parsed = parse_diff(diff);
        let internal = self.is_internal(ctx.submitter);
        let mut findings = Vec::new();

        if !internal {
            if let Some(label) = ctx.task_labels.iter().find(|label| {
                self.config
                    .restricted_labels
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(label))
            }) {
                findings.push(Finding {
                    category: RiskCategory::RestrictedTask,
                    rule: format!("label:{}", label.to_lowercase()),
                    file: None,
                    line: None,
                    excerpt: String::new(),
                });
            }

            for file in parsed.files.iter().filter(|f| self.is_protected(f)) {
                findings.push(Finding {
                    category: RiskCategory::ProtectedPath,
                    rule: "protected_path".to_string(),
                    file: Some(file.clone()),
                    line: None,
                    excerpt: String::new(),
                });
            }
        }

        for added in &parsed.added {
            for pattern in RISK_PATTERNS.iter() {
                if let Some(m) = pattern.regex.find(added.text) {
                    findings.push(Finding {
                        category: pattern.category,
                        rule: pattern.rule.to_string(),
                        file: added.file.clone(),
                        line: added.line,
                        excerpt: excerpt(m.as_str()),
                    });
                }
            }
        }

        let report = ScanReport {
            findings,
            files_touched: parsed.files,
            lines_scanned: parsed.added.len(),
        };

        if report.is_clean() {
            debug!(
                submitter = %ctx.submitter,
                files = report.files_touched.len(),
                lines = report.lines_scanned,
                "✅ Diff scan clean"
            );
        } else {
            warn!(
                submitter = %ctx.submitter,
                internal,
                findings = report.findings.len(),
                summary = %report.summary(),
                "🚨 Diff scan found risky constructs"
            );
        }

        report
    }
}
