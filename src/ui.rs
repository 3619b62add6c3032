/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{manifest::MemberInfo, APP_AUTHOR, APP_NAME, APP_VERSION};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};

pub struct Ui {
    pub verbose: bool,
    pub very_verbose: bool,
    pub debug: bool,
    silent: bool,
    colors: bool,
    progress_bar: Arc<Mutex<Option<ProgressBar>>>,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new(false, false, false, false, true)
    }
}

/// `1536` -> `1.5 KB`. Bytes are shown without decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let text = format!("{:.2}", size);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

/// Visual weight of a message line.
#[derive(Clone, Copy)]
enum Tone {
    Info,
    Detail,
    Success,
    Warning,
    Failure,
}

impl Ui {
    pub fn new(v: bool, vv: bool, d: bool, s: bool, c: bool) -> Self {
        Self {
            verbose: v,
            very_verbose: vv,
            debug: d,
            silent: s,
            colors: c && std::env::var_os("NO_COLOR").is_none(),
            progress_bar: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_verbosity_level(level: u8, s: bool, c: bool) -> Self {
        Self::new(level >= 1, level >= 2, level >= 3, s, c)
    }

    /// Spinner for open-ended waits such as the time authority.
    pub fn show_spinner(&self, msg: &str) {
        if self.silent {
            return;
        }
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["[|]", "[/]", "[-]", "[\\]", "[+]"]);
        pb.set_style(style);
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        if let Ok(mut g) = self.progress_bar.lock() {
            *g = Some(pb);
        }
    }

    pub fn finish_progress(&self) {
        let _ = self.progress_bar.lock().map(|mut g| {
            if let Some(pb) = g.take() {
                pb.finish_and_clear();
            }
        });
    }

    fn paint(&self, icon: &str, msg: &str, tone: Tone) {
        if self.silent && !matches!(tone, Tone::Warning | Tone::Failure) {
            return;
        }
        let indent = " ".repeat(icon.len() + 1);
        let lines: Vec<String> = self
            .wrap_msg(msg, indent.len())
            .split('\n')
            .enumerate()
            .map(|(i, line)| {
                let lead = if i == 0 {
                    format!("{} ", self.tint(icon, tone))
                } else {
                    indent.clone()
                };
                match (self.colors, tone) {
                    (true, Tone::Detail) => format!("{}{}", lead, line.dimmed()),
                    _ => format!("{}{}", lead, line),
                }
            })
            .collect();

        let write = || {
            for line in &lines {
                eprintln!("{}", line);
            }
        };
        match self.progress_bar.lock().ok().and_then(|g| g.clone()) {
            Some(pb) => pb.suspend(write),
            None => write(),
        }
    }

    fn tint(&self, icon: &str, tone: Tone) -> String {
        if !self.colors {
            return icon.to_string();
        }
        match tone {
            Tone::Info => icon.blue().bold(),
            Tone::Detail => icon.dimmed(),
            Tone::Success => icon.green().bold(),
            Tone::Warning => icon.yellow().bold(),
            Tone::Failure => icon.red().bold(),
        }
        .to_string()
    }

    /// Name and version line, shown with `-v`.
    pub fn print_banner(&self) {
        if self.silent || !self.verbose {
            return;
        }
        let title = format!("{} v{}", APP_NAME, APP_VERSION);
        if self.colors {
            eprintln!("{}", title.cyan().bold());
        } else {
            eprintln!("{}", title);
        }
    }

    pub fn print_version_info(&self) {
        println!("{} {}", APP_NAME, APP_VERSION);
        println!("Author:      {}", APP_AUTHOR);
        println!("License:     MIT");
        println!("Description: Signed and encrypted ZIP bundles.");
    }

    /// Names the command being run, shown with `-v`.
    pub fn print_mode_header(&self, title: &str) {
        if self.silent || !self.verbose {
            return;
        }
        let header = format!("-- {} --", title);
        if self.colors {
            eprintln!("\n{}", header.yellow().bold());
        } else {
            eprintln!("\n{}", header);
        }
    }

    pub fn info(&self, msg: &str) {
        if self.verbose {
            self.paint("[i]", msg, Tone::Info);
        }
    }
    pub fn verbose(&self, msg: &str) {
        if self.verbose {
            self.paint("[v]", msg, Tone::Detail);
        }
    }
    pub fn very_verbose(&self, msg: &str) {
        if self.very_verbose {
            self.paint("[vv]", msg, Tone::Detail);
        }
    }
    pub fn debug(&self, msg: &str) {
        if self.debug {
            self.paint("[dbg]", msg, Tone::Detail);
        }
    }
    pub fn success(&self, msg: &str) {
        if !self.silent {
            self.paint("[+]", msg, Tone::Success);
        }
    }
    pub fn warn(&self, msg: &str) {
        if !self.silent {
            self.paint("[!]", msg, Tone::Warning);
        }
    }
    pub fn error(&self, msg: &str) {
        self.paint("[x]", msg, Tone::Failure);
    }

    /// Report block. Unlike the chatty messages above it is shown at
    /// default verbosity, since it carries the actual result.
    pub fn print_summary(&self, title: &str, fields: &[(&str, String)]) {
        if self.silent {
            return;
        }
        if self.colors {
            eprintln!("{}", format!("{}:", title).green().bold());
        } else {
            eprintln!("{}:", title);
        }
        let key_width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(8).max(8);
        let indent = " ".repeat(key_width + 3);

        for (key, val) in fields {
            for (i, line) in self.wrap_msg(val, indent.len()).split('\n').enumerate() {
                let lead = if i > 0 {
                    indent.clone()
                } else if self.colors {
                    format!("  {:<w$} ", key.cyan().bold(), w = key_width)
                } else {
                    format!("  {:<w$} ", key, w = key_width)
                };
                if self.colors {
                    eprintln!("{}{}", lead, line.green());
                } else {
                    eprintln!("{}{}", lead, line);
                }
            }
        }
    }

    /// Lists manifest members with their plaintext sizes.
    pub fn print_members(&self, members: &[MemberInfo]) {
        if self.silent || members.is_empty() {
            return;
        }
        let fields: Vec<(&str, String)> = members
            .iter()
            .map(|m| {
                let mut size = format_file_size(m.size);
                if m.is_encrypted == Some(true) {
                    size.push_str(" (encrypted)");
                }
                (m.member_path.as_str(), size)
            })
            .collect();
        self.print_summary("Members", &fields);
    }

    fn wrap_msg(&self, msg: &str, indent: usize) -> String {
        let max_width = self.term_width();
        let effective_width = if max_width > 20 {
            max_width.saturating_sub(indent).max(20)
        } else {
            max_width.saturating_sub(indent).max(10)
        };
        let mut lines = Vec::new();
        let mut current_line = String::with_capacity(effective_width);

        for word in msg.split_whitespace() {
            let word_len = word.chars().count();
            let needed = if current_line.is_empty() {
                word_len
            } else {
                current_line.chars().count() + 1 + word_len
            };

            if needed <= effective_width {
                if !current_line.is_empty() {
                    current_line.push(' ');
                }
                current_line.push_str(word);
            } else {
                if !current_line.is_empty() {
                    lines.push(std::mem::take(&mut current_line));
                }
                if word_len > effective_width {
                    let chars: Vec<char> = word.chars().collect();
                    for (i, chunk) in chars.chunks(effective_width).enumerate() {
                        if i > 0 {
                            lines.push(std::mem::take(&mut current_line));
                        }
                        current_line.extend(chunk);
                    }
                } else {
                    current_line.push_str(word);
                }
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines.join("\n")
    }

    fn term_width(&self) -> usize {
        std::env::var("COLUMNS")
            .ok()
            .and_then(|s| s.parse().ok())
            .or_else(|| terminal_size::terminal_size().map(|(w, _)| w.0 as usize))
            .unwrap_or(80)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(1_288_490_189), "1.2 GB");
    }

    #[test]
    fn plain_output_keeps_icons_untouched() {
        let ui = Ui::new(true, false, false, false, false);
        assert_eq!(ui.tint("[+]", Tone::Success), "[+]");
        assert_eq!(ui.tint("[x]", Tone::Failure), "[x]");
    }

    #[test]
    fn long_words_are_split() {
        std::env::set_var("COLUMNS", "30");
        let ui = Ui::default();
        let wrapped = ui.wrap_msg(&"x".repeat(45), 4);
        assert!(wrapped.lines().all(|l| l.chars().count() <= 26));
        assert_eq!(wrapped.replace('\n', "").len(), 45);
    }
}
