/*
 * ZipSig Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{
    cipher,
    config::{self, Config, Mode, SignOptions, PASSWORD_ENV},
    error::SignerError,
    keys::PublicKey,
    processor::ArchiveProcessor,
    signing::{EncryptionRequest, SignRequest, Signer},
    time::{CancelToken, TrustedClock},
    ui::{format_file_size, Ui},
    verification::{
        ArtifactVerifier, KeyMatch, RejectReason, SignatureScheme, VerificationReport, Verdict,
    },
    APP_ABOUT, APP_AUTHOR, APP_BIN_NAME, APP_NAME, APP_VERSION,
};
use clap::{Arg, ArgAction, Command};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// How a successful run ended, for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Verification ran and the archive was rejected
    Rejected,
}

pub fn build_command() -> Command {
    let time_url_arg = || {
        Arg::new("time_url")
            .long("time-url")
            .value_name("URL")
            .help("Time authority endpoint (JSON with a `datetime` field)")
    };
    let overwrite_arg = || {
        Arg::new("overwrite")
            .short('f')
            .long("overwrite")
            .action(ArgAction::SetTrue)
            .help("Force overwrite if output exists")
    };

    Command::new(APP_NAME)
        .bin_name(APP_BIN_NAME)
        .version(APP_VERSION)
        .author(APP_AUTHOR)
        .about(APP_ABOUT)
        .disable_version_flag(true)
        .help_template("{about-with-newline}{usage-heading} {usage}\n\n{all-args}\n")
        .subcommand_required(false)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("sign")
                .about("Bundle files into a signed ZIP archive")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("inputs")
                        .required(true)
                        .num_args(1..)
                        .help("Files or directories to include")
                        .index(1),
                )
                .arg(
                    Arg::new("creator")
                        .short('c')
                        .long("creator")
                        .required(true)
                        .help("Creator ID recorded in the manifest"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("DIR")
                        .help("Directory for the signed archive, key and password files"),
                )
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .help("Artifact name prefix (defaults to the creator ID)"),
                )
                .arg(
                    Arg::new("encrypt")
                        .short('e')
                        .long("encrypt")
                        .action(ArgAction::SetTrue)
                        .help("Encrypt every member with a password"),
                )
                .arg(
                    Arg::new("password")
                        .short('p')
                        .long("password")
                        .env(PASSWORD_ENV)
                        .hide_env_values(true)
                        .help("Encryption password (at least 8 characters)"),
                )
                .arg(
                    Arg::new("generate_password")
                        .short('g')
                        .long("generate-password")
                        .action(ArgAction::SetTrue)
                        .help("Encrypt with a freshly generated password"),
                )
                .arg(time_url_arg())
                .arg(overwrite_arg()),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify the signature of an archive")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("input")
                        .required(true)
                        .help("Path to the archive to verify")
                        .index(1),
                )
                .arg(
                    Arg::new("public_key")
                        .short('k')
                        .long("public-key")
                        .help("Public key (PEM) to verify against instead of the embedded one"),
                ),
        )
        .subcommand(
            Command::new("extract")
                .about("Decrypt and repackage the files of a signed archive")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("input")
                        .required(true)
                        .help("Path to the signed archive")
                        .index(1),
                )
                .arg(
                    Arg::new("password")
                        .short('p')
                        .long("password")
                        .env(PASSWORD_ENV)
                        .hide_env_values(true)
                        .help("Password for encrypted members"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Path of the extracted ZIP (defaults to <creator>_extracted.zip)"),
                )
                .arg(overwrite_arg()),
        )
        .subcommand(
            Command::new("check-key")
                .about("Check that a private key belongs to an archive's signer")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("input")
                        .required(true)
                        .help("Path to the signed archive")
                        .index(1),
                )
                .arg(
                    Arg::new("private_key")
                        .required(true)
                        .help("Private key (PEM) to check")
                        .index(2),
                ),
        )
        .subcommand(
            Command::new("time")
                .about("Show trusted time next to the local clock")
                .arg(time_url_arg()),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Set verbosity level (-v for verbose, -vv for more verbose, -vvv for debug)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Suppress all output except errors"),
        )
        .arg(
            Arg::new("version_custom")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version information"),
        )
}

fn init_logging(verbosity_level: u8, quiet: bool) {
    let level = match (quiet, verbosity_level) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, 2) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };
    let _ = env_logger::builder()
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

pub fn run() -> Result<Outcome, SignerError> {
    let matches = build_command().get_matches();

    if matches.get_flag("version_custom") {
        Ui::default().print_version_info();
        return Ok(Outcome::Done);
    }

    let verbosity_level = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");
    init_logging(verbosity_level, quiet);

    let ui = Ui::from_verbosity_level(verbosity_level, quiet, true);
    ui.print_banner();

    if matches.subcommand().is_none() {
        return Err(SignerError::Config("No command provided".into()));
    }

    let config = Config::from_matches(&matches, &ui)?;
    run_logic(config, &ui)
}

fn run_logic(config: Config, ui: &Ui) -> Result<Outcome, SignerError> {
    ui.debug(&format!(
        "Verbosity {}, quiet {}",
        config.verbosity_level, config.quiet
    ));
    match config.mode {
        Mode::Sign(opts) => run_sign(&opts, ui),
        Mode::Verify {
            archive,
            public_key,
        } => run_verify(&archive, public_key.as_deref(), ui),
        Mode::Extract {
            archive,
            password,
            output,
            overwrite,
        } => run_extract(&archive, password.as_deref(), output, overwrite, ui),
        Mode::CheckKey {
            archive,
            private_key,
        } => run_check_key(&archive, &private_key, ui),
        Mode::Time { time_url } => run_time(&time_url, ui),
    }
}

fn run_sign(opts: &SignOptions, ui: &Ui) -> Result<Outcome, SignerError> {
    ui.print_mode_header("SIGNING MODE");

    let targets = [opts.archive_path(), opts.private_key_path(), opts.password_path()];
    let check = if opts.encrypt() { &targets[..] } else { &targets[..2] };
    if !opts.overwrite {
        if let Some(existing) = check.iter().find(|p| p.exists()) {
            return Err(SignerError::Config(format!(
                "Output exists: {}. Use --overwrite.",
                existing.display()
            )));
        }
    }

    ui.info("Collecting files...");
    let files = config::collect_sources(&opts.inputs)?;
    let total: u64 = files.iter().map(|f| f.data.len() as u64).sum();
    ui.verbose(&format!(
        "Collected {} files ({})",
        files.len(),
        format_file_size(total)
    ));
    for file in &files {
        ui.very_verbose(&format!(
            "  {} ({})",
            file.path,
            format_file_size(file.data.len() as u64)
        ));
    }

    let mut request = SignRequest::new(opts.creator_id.clone(), files);
    if opts.generate_password {
        let password = cipher::generate_password(cipher::DEFAULT_PASSWORD_LEN);
        request = request.with_encryption(EncryptionRequest::confirmed(password));
        ui.verbose("Generated encryption password");
    } else if let Some(password) = &opts.password {
        request = request.with_encryption(EncryptionRequest::confirmed(password.clone()));
    }
    request.validate()?;

    ui.verbose(&format!("Time authority: {}", opts.time_url));
    ui.show_spinner("Fetching trusted time and signing...");
    let signer = Signer::new(TrustedClock::http(&opts.time_url));
    let result = signer.sign(&request, &CancelToken::new());
    ui.finish_progress();
    let bundle = result?;

    write_artifact(&opts.archive_path(), &bundle.archive, opts.overwrite)?;
    write_artifact(
        &opts.private_key_path(),
        bundle.private_key_pem.as_bytes(),
        opts.overwrite,
    )?;
    if let Some(password) = &bundle.password {
        write_artifact(&opts.password_path(), password.as_bytes(), opts.overwrite)?;
    }

    ui.success("Archive successfully signed.");
    ui.warn("Keep the private key file safe; it is the only proof of authorship.");

    let mut fields = vec![
        ("Creator", bundle.manifest.creator_id().to_string()),
        ("Time", bundle.manifest.timestamp().to_string()),
        ("Digest", bundle.manifest.content_digest().to_string()),
        ("Archive", opts.archive_path().display().to_string()),
        ("Key", opts.private_key_path().display().to_string()),
    ];
    if bundle.password.is_some() {
        fields.push(("Password", opts.password_path().display().to_string()));
    }
    ui.print_summary("Signing Report", &fields);
    if let Some(members) = bundle.manifest.member_list() {
        ui.print_members(members);
    }
    Ok(Outcome::Done)
}

fn run_verify(archive: &Path, public_key: Option<&Path>, ui: &Ui) -> Result<Outcome, SignerError> {
    ui.print_mode_header("VERIFICATION MODE");
    ui.info(&format!("Verifying integrity: {}", archive.display()));

    let bytes = std::fs::read(archive)?;
    let report = match public_key {
        Some(path) => {
            ui.verbose(&format!("Using external public key: {}", path.display()));
            let key = PublicKey::from_pem(&std::fs::read_to_string(path)?)?;
            ArtifactVerifier::verify_with_key(&bytes, Some(&key))
        }
        None => ArtifactVerifier::verify_bytes(&bytes),
    };

    print_report(&report, ui);
    Ok(if report.is_verified() {
        Outcome::Done
    } else {
        Outcome::Rejected
    })
}

fn print_report(report: &VerificationReport, ui: &Ui) {
    match &report.verdict {
        Verdict::Verified(SignatureScheme::Current) => {
            ui.success("Signature valid. Contents unchanged since signing.")
        }
        Verdict::Verified(SignatureScheme::Legacy) => {
            ui.success("Signature valid (legacy manifest format).")
        }
        Verdict::Rejected(reason) => ui.error(&reason.to_string()),
    }

    let Some(manifest) = &report.manifest else {
        return;
    };
    let status = match &report.verdict {
        Verdict::Verified(_) => "Verified".to_string(),
        Verdict::Rejected(reason) => format!("Rejected ({})", reason.code()),
    };
    let mut fields = vec![
        ("Status", status),
        ("Creator", manifest.creator_id().to_string()),
        ("Time", manifest.timestamp().to_string()),
        ("Digest", manifest.content_digest().to_string()),
        (
            "Encrypted",
            if manifest.is_encrypted() == Some(true) {
                "yes"
            } else {
                "no"
            }
            .to_string(),
        ),
    ];
    if let Some(computed) = &report.computed_digest {
        if computed != manifest.content_digest() {
            fields.push(("Computed", computed.clone()));
        }
    }
    ui.print_summary("Verification Report", &fields);
    if let Some(members) = manifest.member_list() {
        ui.print_members(members);
    }
}

fn run_extract(
    archive: &Path,
    password: Option<&str>,
    output: Option<PathBuf>,
    overwrite: bool,
    ui: &Ui,
) -> Result<Outcome, SignerError> {
    ui.print_mode_header("EXTRACTION MODE");
    let bytes = std::fs::read(archive)?;

    let report = ArtifactVerifier::verify_bytes(&bytes);
    if let Some(reason) = report.reject_reason() {
        ui.warn(&format!("Archive did not verify: {}", reason));
    }

    ui.info("Extracting members...");
    let extraction = ArchiveProcessor::extract(&bytes, password)?;
    let repacked = ArchiveProcessor::repackage(&extraction.files)?;

    let target = output.unwrap_or_else(|| {
        archive
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(extraction.suggested_name())
    });
    write_artifact(&target, &repacked, overwrite)?;

    ui.success("Files extracted.");
    ui.print_summary(
        "Extraction Report",
        &[
            ("Files", extraction.files.len().to_string()),
            ("Decrypted", extraction.decrypted.to_string()),
            ("Output", target.display().to_string()),
        ],
    );
    Ok(Outcome::Done)
}

fn run_check_key(archive: &Path, private_key: &Path, ui: &Ui) -> Result<Outcome, SignerError> {
    ui.print_mode_header("KEY CHECK MODE");
    let report = ArtifactVerifier::verify_bytes(&std::fs::read(archive)?);
    let manifest = match (report.manifest, report.verdict) {
        (Some(manifest), Verdict::Verified(_)) => manifest,
        (Some(manifest), Verdict::Rejected(reason)) => {
            ui.warn(&format!("Archive did not verify: {}", reason));
            manifest
        }
        (None, Verdict::Rejected(RejectReason::ManifestMissing)) => {
            return Err(SignerError::ManifestMissing)
        }
        (None, Verdict::Rejected(reason)) => {
            return Err(SignerError::Validation(reason.to_string()))
        }
        (None, Verdict::Verified(_)) => {
            return Err(SignerError::Validation("verified archive without manifest".into()))
        }
    };
    let pem = std::fs::read_to_string(private_key)?;

    match ArtifactVerifier::check_private_key(&manifest, &pem) {
        KeyMatch::Matched => {
            ui.success(&format!(
                "Private key matches the signer of `{}`.",
                manifest.creator_id()
            ));
            Ok(Outcome::Done)
        }
        KeyMatch::NotMatched => {
            ui.error("Private key does not match this archive's signer.");
            Ok(Outcome::Rejected)
        }
        KeyMatch::Unreadable(msg) => Err(SignerError::Key(msg)),
    }
}

fn run_time(time_url: &str, ui: &Ui) -> Result<Outcome, SignerError> {
    ui.show_spinner("Contacting time authority...");
    let result = TrustedClock::http(time_url).report(&CancelToken::new());
    ui.finish_progress();
    let report = result?;

    ui.print_summary(
        "Clock Report",
        &[
            ("Trusted", report.trusted_rfc3339()),
            ("Local", report.local_rfc3339()),
            (
                "Skew",
                format!("{:.3}s", report.skew().num_milliseconds() as f64 / 1000.0),
            ),
        ],
    );
    Ok(Outcome::Done)
}

/// Writes through a temp file in the target directory, then renames.
fn write_artifact(path: &Path, data: &[u8], overwrite: bool) -> Result<(), SignerError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    persisted.map_err(|e| {
        SignerError::Config(format!("Cannot write {}: {}", path.display(), e.error))
    })?;
    log::debug!("Wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}
