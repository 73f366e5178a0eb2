//! Heuristics over the build tool's raw console output.
//!
//! Progress events carry whatever the terminal would have shown: cursor
//! movement, colour codes, carriage-return overwrites. Nothing here fails;
//! text that matches no pattern is ignored.

use buildlens_core::normalize_label;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Running actions kept per progress block
pub const MAX_RUNNING_ACTIONS: usize = 8;

static FRAME_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[\d*[AF](?:\x1b\[\d*K)?").expect("valid regex"));

static ANSI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid regex"));

static COUNTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[\s*([\d,]+)\s*/\s*([\d,]+)\s*\]\s*(.*)$").expect("valid regex")
});

static RUNNING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<desc>\S.*?);\s*(?P<secs>\d+)s(?:\s+(?P<strategy>[A-Za-z][\w-]*(?:,\s*[A-Za-z][\w-]*)*))?",
    )
    .expect("valid regex")
});

static LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:@@?[\w.~+-]*)?//[\w./+-]*:[\w./+=,@~-]+").expect("valid regex")
});

const BLOCK_ENDS: &[&str] = &["INFO:", "ERROR:", "WARNING:", "DEBUG:", "FAILED:", "Target "];

/// An action the progress bar lists as in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningAction {
    /// Action description as shown on the console
    pub description: String,
    /// Seconds the action has been running
    pub elapsed_secs: u64,
    /// Execution strategy, e.g. `linux-sandbox`
    pub strategy: Option<String>,
}

/// Facts recovered from one progress payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Actions completed so far
    pub completed: Option<u64>,
    /// Actions known so far
    pub total: Option<u64>,
    /// Description on the counter line
    pub top_line: Option<String>,
    /// Longest running first, at most `MAX_RUNNING_ACTIONS`
    pub running: Vec<RunningAction>,
    /// Output stem to execution strategy, from every frame
    pub strategies: IndexMap<String, String>,
    /// `ERROR:` lines
    pub errors: Vec<String>,
    /// `WARNING:` lines
    pub warnings: Vec<String>,
    /// Normalized label to the `ERROR:` block mentioning it
    pub label_errors: IndexMap<String, String>,
}

impl ProgressInfo {
    /// Check if the block carried a status line worth displaying
    #[must_use]
    pub fn has_status(&self) -> bool {
        self.total.is_some() || !self.running.is_empty()
    }

    /// Completion in percent, when both counters are known
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => {
                Some((done.min(total) as f64 / total as f64) * 100.0)
            }
            _ => None,
        }
    }
}

/// Correlation key shared by progress descriptions and action outputs.
///
/// The final path component of the last word, cut at its first `.`;
/// `Compiling src/foo.cc` and `bazel-out/k8/bin/_objs/foo/foo.pic.o` both
/// give `foo`.
#[must_use]
pub fn stem(text: &str) -> String {
    let mut text = text.trim();
    if text.ends_with(']') {
        if let Some(idx) = text.rfind(" [") {
            text = text[..idx].trim_end();
        }
    }
    let word = text.rsplit(char::is_whitespace).next().unwrap_or_default();
    let file = word.rsplit('/').next().unwrap_or_default();
    file.split('.').next().unwrap_or_default().to_string()
}

/// Parse one raw progress payload
#[must_use]
pub fn parse_progress_text(raw: &str) -> ProgressInfo {
    let frames: Vec<Vec<String>> = FRAME_BREAK
        .split(raw)
        .map(clean_frame)
        .filter(|lines| !lines.is_empty())
        .collect();

    let mut info = ProgressInfo::default();
    for frame in &frames {
        collect_strategies(frame, &mut info);
        collect_console(frame, &mut info);
    }
    if let Some(last) = frames.last() {
        read_status(last, &mut info);
    }
    info
}

fn clean_frame(text: &str) -> Vec<String> {
    let text = ANSI.replace_all(text, "");
    text.split('\n')
        .filter_map(|line| {
            let visible = line
                .rsplit('\r')
                .find(|segment| !segment.trim().is_empty())?;
            Some(visible.trim_end().to_string())
        })
        .collect()
}

fn is_console_line(line: &str) -> bool {
    BLOCK_ENDS.iter().any(|prefix| line.starts_with(prefix))
}

/// Text after the counter, or the whole line when there is none
fn without_counter(line: &str) -> &str {
    match COUNTER.captures(line).and_then(|c| c.get(3)) {
        Some(rest) => rest.as_str(),
        None => line,
    }
}

fn parse_count(text: &str) -> Option<u64> {
    text.replace(',', "").parse().ok()
}

fn running_action(line: &str) -> Option<RunningAction> {
    let caps = RUNNING.captures(line)?;
    Some(RunningAction {
        description: caps["desc"].trim().to_string(),
        elapsed_secs: caps["secs"].parse().unwrap_or(0),
        strategy: caps.name("strategy").map(|m| m.as_str().to_string()),
    })
}

fn collect_strategies(frame: &[String], info: &mut ProgressInfo) {
    for line in frame.iter().filter(|l| !is_console_line(l)) {
        if let Some(RunningAction {
            description,
            strategy: Some(strategy),
            ..
        }) = running_action(without_counter(line))
        {
            let key = stem(&description);
            if !key.is_empty() {
                info.strategies.insert(key, strategy);
            }
        }
    }
}

fn collect_console(frame: &[String], info: &mut ProgressInfo) {
    let mut block: Option<Vec<&str>> = None;

    for line in frame {
        let starts_block = line.starts_with("ERROR:");
        if starts_block || is_console_line(line) || COUNTER.is_match(line) {
            if let Some(lines) = block.take() {
                attach_block(&lines, info);
            }
        }

        if starts_block {
            info.errors.push(line.trim().to_string());
            block = Some(vec![line.as_str()]);
        } else if line.starts_with("WARNING:") {
            info.warnings.push(line.trim().to_string());
        } else if let Some(lines) = block.as_mut() {
            lines.push(line.as_str());
        }
    }

    if let Some(lines) = block {
        attach_block(&lines, info);
    }
}

fn attach_block(lines: &[&str], info: &mut ProgressInfo) {
    let Some(found) = lines.iter().find_map(|line| LABEL.find(line)) else {
        return;
    };
    let label = normalize_label(found.as_str().trim_end_matches(['.', ',']));
    let excerpt = lines.join("\n");

    info.label_errors
        .entry(label)
        .and_modify(|existing| {
            existing.push('\n');
            existing.push_str(&excerpt);
        })
        .or_insert(excerpt);
}

fn read_status(frame: &[String], info: &mut ProgressInfo) {
    let mut running = Vec::new();

    for line in frame.iter().filter(|l| !is_console_line(l)) {
        let body = match COUNTER.captures(line) {
            Some(caps) if info.total.is_none() => {
                info.completed = parse_count(&caps[1]);
                info.total = parse_count(&caps[2]);
                let rest = caps.get(3).map_or("", |m| m.as_str());
                let top = rest.split(';').next().unwrap_or_default().trim();
                if !top.is_empty() {
                    info.top_line = Some(top.to_string());
                }
                rest
            }
            Some(_) => continue,
            None => line.as_str(),
        };
        if let Some(action) = running_action(body) {
            running.push(action);
        }
    }

    running.sort_by(|a, b| b.elapsed_secs.cmp(&a.elapsed_secs));
    running.truncate(MAX_RUNNING_ACTIONS);
    info.running = running;
}
