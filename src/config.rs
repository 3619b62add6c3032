// ZipSig Rust - Signed and optionally encrypted ZIP bundles
// Copyright (C) 2026 Tiash H Kabir / @MrCarb0n
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Configuration parsing and validation for the ZipSig CLI.

use crate::{
    error::SignerError, processor::sanitize_file_stem, signing::SourceFile,
    time::DEFAULT_TIME_URL,
};
use clap::{parser::ValueSource, ArgMatches};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Environment variable consulted for the encryption / extraction password.
pub const PASSWORD_ENV: &str = "ZIPSIG_PASSWORD";

#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Files and directories to bundle
    pub inputs: Vec<PathBuf>,
    pub creator_id: String,
    /// Directory receiving the three output artifacts
    pub output_dir: PathBuf,
    /// Artifact name prefix
    pub name: String,
    pub password: Option<String>,
    pub generate_password: bool,
    pub time_url: String,
    pub overwrite: bool,
}

impl SignOptions {
    pub fn encrypt(&self) -> bool {
        self.password.is_some() || self.generate_password
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_signed.zip", self.name))
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_private_key.pem", self.name))
    }

    pub fn password_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_password.txt", self.name))
    }
}

/// Execution mode for the application.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Bundle and sign files
    Sign(SignOptions),
    /// Verify a signed archive, optionally against an external public key
    Verify {
        archive: PathBuf,
        public_key: Option<PathBuf>,
    },
    /// Decrypt and repackage a signed archive
    Extract {
        archive: PathBuf,
        password: Option<String>,
        output: Option<PathBuf>,
        overwrite: bool,
    },
    /// Check that a private key belongs to an archive's signer
    CheckKey {
        archive: PathBuf,
        private_key: PathBuf,
    },
    /// Show trusted time next to the local clock
    Time { time_url: String },
}

/// Application configuration parsed from command-line arguments.
#[derive(Debug)]
pub struct Config {
    pub mode: Mode,
    /// Whether to suppress non-error output
    pub quiet: bool,
    /// Verbosity level (0 = off, 1 = verbose, 2 = very verbose, 3+ = debug)
    pub verbosity_level: u8,
}

impl Config {
    pub fn from_matches(matches: &ArgMatches, ui: &crate::ui::Ui) -> Result<Self, SignerError> {
        let quiet = matches.get_flag("quiet");
        let verbosity_level = matches.get_count("verbose");

        let mode = match matches.subcommand() {
            Some(("sign", sub)) => Mode::Sign(Self::parse_sign(sub, ui)?),
            Some(("verify", sub)) => Self::parse_verify(sub, ui)?,
            Some(("extract", sub)) => Self::parse_extract(sub, ui)?,
            Some(("check-key", sub)) => Mode::CheckKey {
                archive: existing_file(sub, "input", ui)?,
                private_key: existing_file(sub, "private_key", ui)?,
            },
            Some(("time", sub)) => Mode::Time {
                time_url: time_url(sub),
            },
            _ => {
                return Err(SignerError::Config(
                    "No subcommand given. Use sign, verify, extract, check-key or time.".into(),
                ))
            }
        };

        Ok(Self {
            mode,
            quiet,
            verbosity_level,
        })
    }

    fn parse_sign(matches: &ArgMatches, ui: &crate::ui::Ui) -> Result<SignOptions, SignerError> {
        let inputs: Vec<PathBuf> = matches
            .get_many::<String>("inputs")
            .ok_or_else(|| SignerError::Config("No input files specified".into()))?
            .map(PathBuf::from)
            .collect();
        for path in &inputs {
            if !path.exists() {
                return Err(SignerError::Config(format!(
                    "Input does not exist: {}",
                    path.display()
                )));
            }
            ui.debug(&format!("Input: {}", path.display()));
        }

        let creator_id = matches
            .get_one::<String>("creator")
            .cloned()
            .unwrap_or_default();
        if creator_id.trim().is_empty() {
            return Err(SignerError::Config("--creator must not be empty".into()));
        }

        let output_dir = matches
            .get_one::<String>("output")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        if !output_dir.is_dir() {
            return Err(SignerError::Config(format!(
                "Output directory does not exist: {}",
                output_dir.display()
            )));
        }

        let name = matches
            .get_one::<String>("name")
            .cloned()
            .unwrap_or_else(|| sanitize_file_stem(creator_id.trim()));

        // The password may come from the environment; it only takes effect
        // once encryption is asked for explicitly.
        let encrypt = matches.get_flag("encrypt");
        let generate_password = matches.get_flag("generate_password");
        let password = matches.get_one::<String>("password").cloned();
        let typed_password = matches.value_source("password") == Some(ValueSource::CommandLine);
        if typed_password && !encrypt && !generate_password {
            return Err(SignerError::Config("--password needs --encrypt".into()));
        }
        if encrypt && password.is_none() && !generate_password {
            return Err(SignerError::Config(format!(
                "--encrypt needs --password, {} or --generate-password",
                PASSWORD_ENV
            )));
        }
        let password = if encrypt && !generate_password {
            password
        } else {
            None
        };

        ui.debug(&format!(
            "Sign options: creator={}, name={}, output={}",
            creator_id,
            name,
            output_dir.display()
        ));

        Ok(SignOptions {
            inputs,
            creator_id,
            output_dir,
            name,
            password,
            generate_password,
            time_url: time_url(matches),
            overwrite: matches.get_flag("overwrite"),
        })
    }

    fn parse_verify(matches: &ArgMatches, ui: &crate::ui::Ui) -> Result<Mode, SignerError> {
        let archive = existing_file(matches, "input", ui)?;
        let public_key = match matches.get_one::<String>("public_key") {
            Some(_) => Some(existing_file(matches, "public_key", ui)?),
            None => None,
        };
        Ok(Mode::Verify {
            archive,
            public_key,
        })
    }

    fn parse_extract(matches: &ArgMatches, ui: &crate::ui::Ui) -> Result<Mode, SignerError> {
        Ok(Mode::Extract {
            archive: existing_file(matches, "input", ui)?,
            password: matches.get_one::<String>("password").cloned(),
            output: matches.get_one::<String>("output").map(PathBuf::from),
            overwrite: matches.get_flag("overwrite"),
        })
    }
}

fn time_url(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("time_url")
        .cloned()
        .unwrap_or_else(|| DEFAULT_TIME_URL.to_string())
}

fn existing_file(
    matches: &ArgMatches,
    id: &str,
    ui: &crate::ui::Ui,
) -> Result<PathBuf, SignerError> {
    let path = PathBuf::from(
        matches
            .get_one::<String>(id)
            .ok_or_else(|| SignerError::Config(format!("Missing argument: {}", id)))?,
    );
    let meta = std::fs::metadata(&path).map_err(|e| {
        SignerError::Config(format!("Cannot access {}: {}", path.display(), e))
    })?;
    if !meta.is_file() {
        return Err(SignerError::Config(format!(
            "Not a regular file: {}",
            path.display()
        )));
    }
    ui.debug(&format!("Using {}: {}", id, path.display()));
    Ok(path)
}

/// Reads every input into memory. A file becomes a member named after
/// itself; a directory contributes its files prefixed with the directory
/// name, using forward slashes.
pub fn collect_sources(inputs: &[PathBuf]) -> Result<Vec<SourceFile>, SignerError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            let name = file_name(input)?;
            files.push(SourceFile::new(name, std::fs::read(input)?));
            continue;
        }

        let base = input.parent().unwrap_or_else(|| Path::new(""));
        let root_name = file_name(input).ok();
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.map_err(|e| SignerError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match root_name {
                Some(_) => entry.path().strip_prefix(base),
                None => entry.path().strip_prefix(input),
            }
            .map_err(|e| SignerError::Config(format!("{}: {}", entry.path().display(), e)))?;
            let member = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            log::trace!("Collected {}", member);
            files.push(SourceFile::new(member, std::fs::read(entry.path())?));
        }
    }
    Ok(files)
}

fn file_name(path: &Path) -> Result<String, SignerError> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            SignerError::Config(format!(
                "Invalid input name (no name or non-UTF8): {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collects_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(project.join("sub")).unwrap();
        fs::write(project.join("b.txt"), "b").unwrap();
        fs::write(project.join("sub/c.txt"), "c").unwrap();
        let loose = dir.path().join("a.txt");
        fs::write(&loose, "a").unwrap();

        let files = collect_sources(&[loose, project]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "project/b.txt", "project/sub/c.txt"]);
        assert_eq!(files[2].data, b"c");
    }

    #[test]
    fn sign_artifact_names() {
        let opts = SignOptions {
            inputs: vec![],
            creator_id: "alice".into(),
            output_dir: PathBuf::from("out"),
            name: "alice".into(),
            password: None,
            generate_password: false,
            time_url: DEFAULT_TIME_URL.into(),
            overwrite: false,
        };
        assert!(!opts.encrypt());
        assert_eq!(opts.archive_path(), Path::new("out/alice_signed.zip"));
        assert_eq!(opts.private_key_path(), Path::new("out/alice_private_key.pem"));
        assert_eq!(opts.password_path(), Path::new("out/alice_password.txt"));
    }

    fn parse_sign_args(extra: &[&str]) -> Result<Config, SignerError> {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.txt");
        fs::write(&input, "a").unwrap();
        let mut args = vec![
            "zipsig".to_string(),
            "sign".into(),
            input.display().to_string(),
            "-c".into(),
            " alice ".into(),
            "-o".into(),
            dir.path().display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        let matches = crate::cli::build_command()
            .try_get_matches_from(args)
            .unwrap();
        Config::from_matches(&matches, &crate::ui::Ui::default())
    }

    fn sign_options(config: Config) -> SignOptions {
        match config.mode {
            Mode::Sign(opts) => opts,
            other => panic!("expected sign mode, got {:?}", other),
        }
    }

    #[test]
    fn environment_password_needs_explicit_encrypt() {
        std::env::set_var(PASSWORD_ENV, "extract-pass-123");

        let plain = sign_options(parse_sign_args(&[]).unwrap());
        assert!(!plain.encrypt());
        assert!(plain.password.is_none());
        assert_eq!(plain.creator_id, " alice ");
        assert_eq!(plain.name, "alice");

        let encrypted = sign_options(parse_sign_args(&["--encrypt"]).unwrap());
        assert!(encrypted.encrypt());
        assert_eq!(encrypted.password.as_deref(), Some("extract-pass-123"));

        std::env::remove_var(PASSWORD_ENV);
    }

    #[test]
    fn typed_password_without_encrypt_is_refused() {
        assert!(matches!(
            parse_sign_args(&["-p", "correct-horse-1"]),
            Err(SignerError::Config(_))
        ));
        let opts = sign_options(parse_sign_args(&["-e", "-p", "correct-horse-1"]).unwrap());
        assert_eq!(opts.password.as_deref(), Some("correct-horse-1"));
    }
}
