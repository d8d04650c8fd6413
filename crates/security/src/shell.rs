//! Multi-layer deny filter for shell commands.
//!
//! Safety layers, short-circuiting on the first rejection:
//!   1. Blocked base commands (mkfs, shutdown, reboot, ...)
//!   2. Parsed `rm` detection with normalized short/long flags and dangerous targets
//!   3. Interpreter `-c` escape detection (python, bash, perl, ... with inline code)
//!   4. Regex fallback for patterns that are hard to parse structurally
//!      (fork bombs, pipe-to-shell, credential access, device writes)
//!
//! The filter is pure: command string in, `None` (safe) or a reason out.

use regex_lite::Regex;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Layer 1: commands that are always dangerous regardless of arguments
// ---------------------------------------------------------------------------

const BLOCKED_COMMANDS: &[&str] = &["mkfs", "shutdown", "reboot", "halt", "poweroff"];

const BLOCKED_SYSTEMCTL_ACTIONS: &[&str] = &["poweroff", "reboot", "halt"];

// ---------------------------------------------------------------------------
// Layer 2: rm flag normalization and dangerous target detection
// ---------------------------------------------------------------------------

const RM_LONG_FLAG_MAP: &[(&str, char)] = &[
    ("--recursive", 'r'),
    ("--force", 'f'),
    ("--interactive", 'i'),
    ("--dir", 'd'),
    ("--verbose", 'v'),
    ("--no-preserve-root", '!'),
];

const DANGEROUS_RM_TARGETS: &[&str] = &[
    "/", "/*", "~", "$HOME", "/home", "/etc", "/var", "/usr", "/bin", "/sbin", "/lib",
    "/boot", "/root", "/opt", "/srv",
];

// ---------------------------------------------------------------------------
// Layer 3: interpreters that can execute arbitrary code via -c
// ---------------------------------------------------------------------------

const INTERPRETER_COMMANDS: &[&str] = &[
    "python", "bash", "sh", "zsh", "dash", "ksh", "fish", "perl", "ruby", "node", "lua",
];

/// Maximum recursion depth for interpreter escape checking.
const MAX_CHECK_DEPTH: usize = 3;

// ---------------------------------------------------------------------------
// Layer 4: regex fallback for patterns hard to parse structurally
// ---------------------------------------------------------------------------

static REGEX_DENY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Fork bombs
        r":\(\)\s*\{\s*:\|:\s*&\s*\}\s*;",
        // dd to disk devices
        r"\bdd\s+if=",
        // Redirect to block devices
        r">\s*/dev/sd[a-z]",
        r">\s*/dev/nvme",
        r">\s*/dev/disk",
        // Permission escalation on root
        r"\bchmod\s+.*\s+/\s*$",
        r"\bchown\s+.*\s+/\s*$",
        r"\bchattr\s+\+i\s+/",
        // Piped execution of remote code
        r"\bcurl\b.*\|\s*(ba)?sh\b",
        r"\bwget\b.*\|\s*(ba)?sh\b",
        r"\bcurl\b.*\|\s*python",
        r"\bwget\b.*\|\s*python",
        r"\bcurl\b.*\|\s*perl",
        // Credential file access
        r"\bcat\s+.*\.ssh/id_",
        r"\bcat\s+.*\.env\b",
        r"\bcat\s+.*/\.aws/credentials",
        r"\bcat\s+.*/\.netrc",
        // History theft
        r"\bcat\s+.*\.(bash_|zsh_)?history",
        // Network exfiltration of sensitive files
        r"\bcurl\b.*-[a-z]*d\s*@.*\.(env|pem|key)\b",
        r"\bscp\s+.*\.(env|pem|key)\s",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("deny pattern is valid"))
    .collect()
});

/// Dangerous constructs when embedded in interpreter code arguments.
static INTERPRETER_CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"rm\s.*-.*r.*-.*f.*\s+/",
        r"rm\s+-rf\s",
        r"rm\s+--recursive",
        r"\bshutdown\b",
        r"\breboot\b",
        r"\bhalt\b",
        r"\bmkfs\b",
        r"\.ssh/id_",
        r"\.env\b",
        r"/\.aws/credentials",
        r"\.(bash_|zsh_)?history",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("code pattern is valid"))
    .collect()
});

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Split a shell command string on `;` `&&` `||` into subcommands.
///
/// Respects single and double quoting so that separators inside strings are
/// not treated as command boundaries.
fn split_shell_commands(command: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;

    let chars: Vec<char> = command.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\\' && i + 1 < chars.len() && !in_single {
            current.push(ch);
            current.push(chars[i + 1]);
            i += 2;
            continue;
        }

        if ch == '\'' && !in_double {
            in_single = !in_single;
            current.push(ch);
            i += 1;
            continue;
        }

        if ch == '"' && !in_single {
            in_double = !in_double;
            current.push(ch);
            i += 1;
            continue;
        }

        if !in_single && !in_double {
            let two = (ch, chars.get(i + 1).copied());
            if two == ('&', Some('&')) || two == ('|', Some('|')) {
                let part = current.trim().to_string();
                if !part.is_empty() {
                    parts.push(part);
                }
                current.clear();
                i += 2;
                continue;
            }
            if ch == ';' {
                let part = current.trim().to_string();
                if !part.is_empty() {
                    parts.push(part);
                }
                current.clear();
                i += 1;
                continue;
            }
        }

        current.push(ch);
        i += 1;
    }

    let part = current.trim().to_string();
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

/// Tokenize with shell-quoting rules; `Err` on unterminated quotes.
fn shell_split(command: &str) -> Result<Vec<String>, ()> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut in_single = false;
    let mut in_double = false;

    let chars: Vec<char> = command.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if in_single {
            if ch == '\'' {
                in_single = false;
            } else {
                current.push(ch);
            }
            i += 1;
            continue;
        }

        if ch == '\\' {
            if i + 1 >= chars.len() {
                return Err(());
            }
            current.push(chars[i + 1]);
            has_token = true;
            i += 2;
            continue;
        }

        if in_double {
            if ch == '"' {
                in_double = false;
            } else {
                current.push(ch);
            }
            i += 1;
            continue;
        }

        match ch {
            '\'' => {
                in_single = true;
                has_token = true;
            }
            '"' => {
                in_double = true;
                has_token = true;
            }
            c if c.is_whitespace() => {
                if has_token || !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
        i += 1;
    }

    if in_single || in_double {
        return Err(());
    }
    if has_token || !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Tokenize a command, falling back to whitespace split on parse error.
fn tokenize(command: &str) -> Vec<String> {
    shell_split(command)
        .unwrap_or_else(|_| command.split_whitespace().map(str::to_string).collect())
}

/// Strip a leading `sudo` and its `-X [arg]` flags from tokens.
fn strip_sudo(tokens: &[String]) -> &[String] {
    if tokens.first().map(String::as_str) != Some("sudo") {
        return tokens;
    }
    let mut i = 1;
    while i < tokens.len() && tokens[i].starts_with('-') {
        i += 1;
        if i < tokens.len() {
            i += 1;
        }
    }
    if i < tokens.len() { &tokens[i..] } else { tokens }
}

/// Extract normalized single-char flags from rm arguments.
fn extract_rm_flags(tokens: &[String]) -> Vec<char> {
    let mut flags = Vec::new();
    for token in &tokens[1..] {
        if token == "--" {
            break;
        }
        if token.starts_with("--") {
            if let Some((_, mapped)) = RM_LONG_FLAG_MAP.iter().find(|(name, _)| name == token) {
                flags.push(*mapped);
            }
        } else if token.starts_with('-')
            && token.len() > 1
            && !token[1..].chars().all(|c| c.is_ascii_digit())
        {
            flags.extend(token[1..].chars());
        }
    }
    flags
}

/// Extract non-flag arguments (file/dir targets) from rm tokens.
fn extract_rm_targets(tokens: &[String]) -> Vec<&str> {
    let mut targets = Vec::new();
    let mut past_flags = false;
    for token in &tokens[1..] {
        if token == "--" {
            past_flags = true;
            continue;
        }
        if past_flags || !token.starts_with('-') {
            targets.push(token.as_str());
        }
    }
    targets
}

/// Check whether an rm command is dangerous based on parsed flags and targets.
fn check_rm(tokens: &[String]) -> Option<String> {
    let flags = extract_rm_flags(tokens);
    let targets = extract_rm_targets(tokens);

    let has_recursive = flags.contains(&'r');
    let has_force = flags.contains(&'f');

    if flags.contains(&'!') && has_recursive {
        return Some("rm with --no-preserve-root and recursive flag".into());
    }

    for target in targets {
        let trimmed = target.trim_end_matches('/');
        let normalized = if trimmed.is_empty() { "/" } else { trimmed };
        if has_recursive && normalized == "/" {
            return Some("rm -r on root filesystem".into());
        }
        if has_recursive && has_force {
            for dangerous in DANGEROUS_RM_TARGETS {
                let dangerous_trimmed = dangerous.trim_end_matches('/');
                if normalized == *dangerous
                    || (!dangerous_trimmed.is_empty() && normalized == dangerous_trimmed)
                {
                    return Some(format!("rm -rf on critical path: {target}"));
                }
            }
        }
    }
    None
}

/// Whether a base command is an interpreter that takes inline code.
fn is_interpreter(base_cmd: &str) -> bool {
    INTERPRETER_COMMANDS.contains(&base_cmd)
        || base_cmd.starts_with("python3")
        || base_cmd == "eval"
}

/// Check whether an interpreter `-c` command executes dangerous inline code.
///
/// Uses two strategies:
///   1. Recursive shell-level check (catches `bash -c "rm -rf /"`)
///   2. Regex scan of the raw code argument (catches
///      `python3 -c "os.system('rm -rf /')"`)
fn check_interpreter(tokens: &[String], base_cmd: &str, depth: usize) -> Option<String> {
    let mut code_arg: Option<String> = None;
    for (i, token) in tokens.iter().enumerate() {
        if token == "-c" && i + 1 < tokens.len() {
            code_arg = Some(tokens[i + 1].clone());
            break;
        }
        if let Some(inline) = token.strip_prefix("-c")
            && !inline.is_empty()
        {
            code_arg = Some(inline.to_string());
            break;
        }
    }

    if base_cmd == "eval" && tokens.len() > 1 && code_arg.is_none() {
        code_arg = Some(tokens[1..].join(" "));
    }

    let code = code_arg?;

    // Strategy 1: treat the code as shell and check recursively
    if let Some(danger) = check_depth(&code, depth + 1) {
        return Some(format!("Interpreter escape via {base_cmd} -c: {danger}"));
    }

    // Strategy 2: regex scan for dangerous constructs embedded in code strings
    for pattern in INTERPRETER_CODE_PATTERNS.iter() {
        if pattern.is_match(&code) {
            return Some(format!(
                "Interpreter escape via {base_cmd} -c: code contains '{}'",
                pattern.as_str()
            ));
        }
    }

    // Strategy 3: also run the regex deny layer over the code argument
    for pattern in REGEX_DENY.iter() {
        if pattern.is_match(&code) {
            return Some(format!(
                "Interpreter escape via {base_cmd} -c: {}",
                pattern.as_str()
            ));
        }
    }

    None
}

/// Multi-layer check, bounded by recursion depth.
fn check_depth(command: &str, depth: usize) -> Option<String> {
    if depth >= MAX_CHECK_DEPTH {
        return None;
    }

    for subcmd in split_shell_commands(command) {
        let tokens = tokenize(&subcmd);
        if tokens.is_empty() {
            continue;
        }

        let tokens = strip_sudo(&tokens);
        if tokens.is_empty() {
            continue;
        }

        let base_cmd = tokens[0].rsplit('/').next().unwrap_or(&tokens[0]);

        // Layer 1: unconditionally blocked commands
        if BLOCKED_COMMANDS.contains(&base_cmd) || base_cmd.starts_with("mkfs.") {
            return Some(format!("Blocked command: {base_cmd}"));
        }

        if base_cmd == "systemctl"
            && tokens.len() > 1
            && BLOCKED_SYSTEMCTL_ACTIONS.contains(&tokens[1].as_str())
        {
            return Some(format!("systemctl {} is blocked", tokens[1]));
        }

        if base_cmd == "init" && tokens.len() > 1 && (tokens[1] == "0" || tokens[1] == "6") {
            return Some(format!("init {} (system halt/reboot)", tokens[1]));
        }

        // Layer 2: rm with parsed flags
        if base_cmd == "rm"
            && let Some(reason) = check_rm(tokens)
        {
            return Some(reason);
        }

        // Layer 3: interpreter -c escape
        if is_interpreter(base_cmd)
            && let Some(reason) = check_interpreter(tokens, base_cmd, depth)
        {
            return Some(reason);
        }
    }

    // Layer 4: regex fallback on the full command string
    for pattern in REGEX_DENY.iter() {
        if pattern.is_match(command) {
            return Some(format!("Blocked: matches pattern '{}'", pattern.as_str()));
        }
    }

    None
}

/// Check a shell command against the deny layers.
///
/// Returns `None` if the command is considered safe, or a short human
/// readable reason when it is blocked.
pub fn check_command(command: &str) -> Option<String> {
    check_depth(command, 0)
}
