//! sealfs: encrypted drive CLI
//!
//! Drive commands:
//!   create                     - create a new drive in the drive directory
//!   info                       - drive id, chunk size and this device's nonce range
//!   passwd                     - change the drive password
//!
//! File commands (paths are virtual, `/`-separated, relative to the drive root):
//!   ls [<path>]                - list a virtual directory
//!   mkdir <path>               - create a virtual directory and its parents
//!   import <sources...>        - encrypt real files and trees into the drive
//!   export <paths...>          - decrypt drive files into a real directory
//!   cat <path>                 - decrypt a file to stdout through the cached reader
//!   rm | cp | mv | rename      - manage entries inside the drive
//!
//! Authorization:
//!   auth id | export | import | revoke

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::cell::Cell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sealfs_core::config::SealConfig;
use sealfs_core::{SealError, SealResult};
use sealfs_drive::{
    auto_rename, BatchExportOptions, BatchImportOptions, CachedReader, Drive, FileCommander,
    TreeOptions, VirtualFile,
};
use sealfs_sequence::{FileSequencer, NonceSequencer};
use sealfs_storage::{LocalFile, RealFileRef};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealfs",
    version,
    about = "Encrypted drives over plain directories",
    long_about = "sealfs: keep a directory tree encrypted at rest, file by file, \
                  and share write access between devices without nonce reuse"
)]
struct Cli {
    /// Path to sealfs.toml configuration file
    #[arg(long, short = 'c', env = "SEALFS_CONFIG", default_value = "sealfs.toml")]
    config: PathBuf,

    /// Drive directory
    #[arg(long, short = 'd', env = "SEALFS_DRIVE", default_value = ".")]
    drive: PathBuf,

    /// Drive password (prompted for when not set)
    #[arg(long, env = "SEALFS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SEALFS_LOG", default_value = "warn")]
    log: String,

    /// Log format
    #[arg(long, env = "SEALFS_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new drive
    Create {
        /// Integrity chunk size for new files (overrides config)
        #[arg(long)]
        chunk_size: Option<u32>,
    },

    /// Show drive and authorization details
    Info,

    /// Change the drive password
    Passwd {
        /// New password (prompted for when not set)
        #[arg(long, env = "SEALFS_NEW_PASSWORD", hide_env_values = true)]
        new_password: Option<String>,
    },

    /// List a virtual directory
    Ls {
        /// Virtual directory (default: drive root)
        path: Option<String>,
    },

    /// Create a virtual directory, including missing parents
    Mkdir { path: String },

    /// Encrypt real files and directory trees into the drive
    Import {
        /// Real files or directories
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Virtual destination directory (default: drive root)
        #[arg(long)]
        dest: Option<String>,
        /// Worker threads per file (overrides config)
        #[arg(long)]
        threads: Option<usize>,
        /// Skip integrity tags
        #[arg(long)]
        no_integrity: bool,
        /// Remove the real sources after a successful import
        #[arg(long)]
        delete_source: bool,
        /// Rename entries whose name is taken instead of failing them
        #[arg(long)]
        auto_rename: bool,
    },

    /// Decrypt drive files and directories into a real directory
    Export {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Real destination directory (default: the drive's export directory)
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        threads: Option<usize>,
        /// Do not verify integrity tags
        #[arg(long)]
        no_verify: bool,
        /// Remove the drive files after a successful export
        #[arg(long)]
        delete_source: bool,
        #[arg(long)]
        auto_rename: bool,
    },

    /// Decrypt a file to stdout
    Cat {
        path: String,
        /// Reader threads (overrides config)
        #[arg(long)]
        threads: Option<usize>,
        /// Verify integrity tags while reading
        #[arg(long)]
        verify: bool,
    },

    /// Delete files and directories from the drive
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Copy entries into a virtual directory
    Cp {
        #[arg(required = true)]
        sources: Vec<String>,
        dest: String,
        #[arg(long)]
        auto_rename: bool,
    },

    /// Move entries into a virtual directory
    Mv {
        #[arg(required = true)]
        sources: Vec<String>,
        dest: String,
        #[arg(long)]
        auto_rename: bool,
    },

    /// Rename an entry in place
    Rename { path: String, new_name: String },

    /// Device authorization hand-off
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Print this device's auth id, requesting one if needed
    Id,

    /// Give half of this device's nonce range to another device
    Export {
        /// Auth id printed by `sealfs auth id` on the other device
        auth_id: String,
        /// Auth file to write (default: share/<auth_config_filename>)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Activate this device from an auth file
    Import {
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Permanently give up this device's write access
    Revoke,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config = SealConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    tracing::debug!(config = %cli.config.display(), drive = %cli.drive.display(), "sealfs starting");

    let sequencer: Arc<dyn NonceSequencer> = Arc::new(FileSequencer::open(&config.sequencer.path));
    let root = LocalFile::shared(&cli.drive);

    if let Commands::Create { chunk_size } = &cli.command {
        return cmd_create(&cli, &config, root, sequencer, *chunk_size);
    }

    let drive = Drive::open(root, sequencer, config.drive.clone())
        .with_context(|| format!("opening drive: {}", cli.drive.display()))?;
    let password = read_password(cli.password.as_deref(), "Drive password: ", false)?;
    drive.unlock(&password).context("unlocking drive")?;

    let result = run(&cli, &config, &drive);
    drive.lock();
    result
}

fn run(cli: &Cli, config: &SealConfig, drive: &Arc<Drive>) -> Result<()> {
    match &cli.command {
        Commands::Create { .. } => anyhow::bail!("a drive already exists at {}", cli.drive.display()),
        Commands::Info => cmd_info(drive, cli),
        Commands::Passwd { new_password } => cmd_passwd(drive, new_password.as_deref()),
        Commands::Ls { path } => cmd_ls(drive, path.as_deref().unwrap_or("")),
        Commands::Mkdir { path } => cmd_mkdir(drive, path),
        Commands::Import {
            sources,
            dest,
            threads,
            no_integrity,
            delete_source,
            auto_rename,
        } => {
            let mut transfer = config.transfer.clone();
            if let Some(threads) = threads {
                transfer.threads = *threads;
            }
            let commander = FileCommander::from_settings(&transfer);
            let flags = BatchFlags {
                delete_source: *delete_source,
                integrity: transfer.integrity && !no_integrity,
                auto_rename: *auto_rename,
            };
            cmd_import(drive, &commander, sources, dest.as_deref().unwrap_or(""), flags)
        }
        Commands::Export {
            paths,
            dest,
            threads,
            no_verify,
            delete_source,
            auto_rename,
        } => {
            let mut transfer = config.transfer.clone();
            if let Some(threads) = threads {
                transfer.threads = *threads;
            }
            let commander = FileCommander::from_settings(&transfer);
            let flags = BatchFlags {
                delete_source: *delete_source,
                integrity: !no_verify,
                auto_rename: *auto_rename,
            };
            cmd_export(drive, &commander, paths, dest.as_deref(), flags)
        }
        Commands::Cat {
            path,
            threads,
            verify,
        } => {
            let mut reader = config.reader.clone();
            if let Some(threads) = threads {
                reader.threads = *threads;
            }
            cmd_cat(drive, path, &reader, *verify)
        }
        Commands::Rm { paths } => cmd_rm(drive, paths),
        Commands::Cp {
            sources,
            dest,
            auto_rename,
        } => cmd_copy(drive, sources, dest, *auto_rename, false),
        Commands::Mv {
            sources,
            dest,
            auto_rename,
        } => cmd_copy(drive, sources, dest, *auto_rename, true),
        Commands::Rename { path, new_name } => cmd_rename(drive, path, new_name),
        Commands::Auth { action } => cmd_auth(drive, action),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries file contents for `cat`
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Password and path helpers ─────────────────────────────────────────────────

fn read_password(given: Option<&str>, prompt: &str, confirm: bool) -> Result<SecretString> {
    if let Some(pw) = given {
        return Ok(SecretString::from(pw.to_string()));
    }
    let first = rpassword::prompt_password(prompt).context("reading password")?;
    if first.is_empty() {
        anyhow::bail!("empty password");
    }
    if confirm {
        let second = rpassword::prompt_password("Repeat password: ").context("reading password")?;
        if first != second {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(first))
}

/// Non-empty components of a `/`-separated virtual path
fn split_path(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect()
}

/// Walk a virtual path from the drive root.
fn resolve(drive: &Arc<Drive>, path: &str) -> Result<VirtualFile> {
    let mut current = drive.root();
    for part in split_path(path) {
        current = current
            .child(part)
            .with_context(|| format!("looking up {part:?} in /{path}"))?
            .with_context(|| format!("no such file or directory: /{path}"))?;
    }
    Ok(current)
}

fn resolve_dir(drive: &Arc<Drive>, path: &str) -> Result<VirtualFile> {
    let dir = resolve(drive, path)?;
    if !dir.is_directory() {
        anyhow::bail!("not a directory: /{path}");
    }
    Ok(dir)
}

fn resolve_all(drive: &Arc<Drive>, paths: &[String]) -> Result<Vec<VirtualFile>> {
    paths.iter().map(|p| resolve(drive, p)).collect()
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn make_spinner(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")?);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

// ── `sealfs create` / `info` / `passwd` ───────────────────────────────────────

fn cmd_create(
    cli: &Cli,
    config: &SealConfig,
    root: RealFileRef,
    sequencer: Arc<dyn NonceSequencer>,
    chunk_size: Option<u32>,
) -> Result<()> {
    let mut settings = config.drive.clone();
    if let Some(chunk_size) = chunk_size {
        settings.default_chunk_size = chunk_size;
    }
    let password = read_password(cli.password.as_deref(), "New drive password: ", true)?;

    let pb = make_spinner("create")?;
    pb.set_message("deriving keys...");
    let drive = Drive::create(root, &password, sequencer, settings)
        .with_context(|| format!("creating drive: {}", cli.drive.display()))?;
    pb.finish_and_clear();

    println!("Created drive at {}", cli.drive.display());
    println!("  drive id: {}", drive.drive_id_hex()?);
    println!("  auth id:  {}", drive.auth_id()?);
    drive.lock();
    Ok(())
}

fn cmd_info(drive: &Arc<Drive>, cli: &Cli) -> Result<()> {
    let drive_id = drive.drive_id_hex()?;
    println!("Drive:      {}", cli.drive.display());
    println!("  id:         {drive_id}");
    println!("  chunk size: {}", fmt_bytes(drive.default_chunk_size() as u64));
    match drive.sequencer().get_sequence(&drive_id)? {
        Some(seq) => {
            println!("  auth id:    {}", seq.auth_id);
            println!("  status:     {:?}", seq.status);
            if let (Some(next), Some(max)) = (seq.next_nonce, seq.max_nonce) {
                println!("  nonces:     {next}..{max} ({} left)", max.saturating_sub(next));
            }
        }
        None => println!("  auth:       none (run `sealfs auth id` to request one)"),
    }
    Ok(())
}

fn cmd_passwd(drive: &Arc<Drive>, new_password: Option<&str>) -> Result<()> {
    let password = read_password(new_password, "New drive password: ", true)?;
    if password.expose_secret().is_empty() {
        anyhow::bail!("empty password");
    }
    drive.set_password(&password).context("changing password")?;
    println!("Password changed");
    Ok(())
}

// ── `sealfs ls` / `mkdir` ─────────────────────────────────────────────────────

fn cmd_ls(drive: &Arc<Drive>, path: &str) -> Result<()> {
    let dir = resolve_dir(drive, path)?;
    let mut rows = Vec::new();
    for file in dir.list_files()? {
        match file.name() {
            Ok(name) => rows.push((file.is_directory(), name, file)),
            Err(e) => tracing::warn!(real = %file.real_file().name(), "skipping entry: {e}"),
        }
    }
    rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    for (is_dir, name, file) in rows {
        if is_dir {
            println!("{:>10}  {name}/", "-");
        } else {
            let size = file.len().map(fmt_bytes).unwrap_or_else(|_| "?".into());
            println!("{size:>10}  {name}");
        }
    }
    Ok(())
}

fn cmd_mkdir(drive: &Arc<Drive>, path: &str) -> Result<()> {
    let mut current = drive.root();
    for part in split_path(path) {
        current = match current.child(part)? {
            Some(existing) if existing.is_directory() => existing,
            Some(_) => anyhow::bail!("not a directory: {part}"),
            None => current
                .create_directory(part)
                .with_context(|| format!("creating {part}"))?,
        };
    }
    Ok(())
}

// ── `sealfs import` / `export` ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct BatchFlags {
    delete_source: bool,
    integrity: bool,
    auto_rename: bool,
}

fn cmd_import(
    drive: &Arc<Drive>,
    commander: &FileCommander,
    sources: &[PathBuf],
    dest: &str,
    flags: BatchFlags,
) -> Result<()> {
    let dir = resolve_dir(drive, dest)?;
    let sources: Vec<RealFileRef> = sources
        .iter()
        .map(|p| {
            if !p.exists() {
                anyhow::bail!("path not found: {}", p.display());
            }
            Ok(LocalFile::shared(p))
        })
        .collect::<Result<_>>()?;

    let failed = Cell::new(0usize);
    let pb = make_progress_bar(0, "import")?;
    let pb_clone = pb.clone();
    let progress = move |name: &str, done: u64, total: u64| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(name.to_string());
    };
    let pb_fail = pb.clone();
    let mut options = BatchImportOptions {
        delete_source: flags.delete_source,
        integrity: flags.integrity,
        auto_rename: flags.auto_rename,
        on_failed: Some(Box::new(|source: &RealFileRef, e: &SealError| {
            failed.set(failed.get() + 1);
            pb_fail.println(format!("  failed: {}: {e}", source.path()));
        })),
        on_progress: Some(&progress),
    };

    let imported = commander.import_files(&sources, &dir, &mut options);
    drop(options);
    pb.finish_and_clear();

    println!("Import complete:");
    println!("  imported: {} files", imported.len());
    if failed.get() > 0 {
        anyhow::bail!("{} entries failed to import", failed.get());
    }
    Ok(())
}

fn cmd_export(
    drive: &Arc<Drive>,
    commander: &FileCommander,
    paths: &[String],
    dest: Option<&Path>,
    flags: BatchFlags,
) -> Result<()> {
    let files = resolve_all(drive, paths)?;
    let dir = match dest {
        Some(path) => {
            std::fs::create_dir_all(path)
                .with_context(|| format!("creating {}", path.display()))?;
            LocalFile::shared(path)
        }
        None => drive.export_dir()?,
    };

    let failed = Cell::new(0usize);
    let pb = make_progress_bar(0, "export")?;
    let pb_clone = pb.clone();
    let progress = move |name: &str, done: u64, total: u64| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(name.to_string());
    };
    let pb_fail = pb.clone();
    let mut options = BatchExportOptions {
        delete_source: flags.delete_source,
        integrity: flags.integrity,
        auto_rename: flags.auto_rename,
        on_failed: Some(Box::new(|file: &VirtualFile, e: &SealError| {
            failed.set(failed.get() + 1);
            let name = file.path().unwrap_or_else(|_| file.real_file().path());
            pb_fail.println(format!("  failed: {name}: {e}"));
        })),
        on_progress: Some(&progress),
    };

    let exported = commander.export_files(&files, &dir, &mut options);
    drop(options);
    pb.finish_and_clear();

    println!("Export complete → {}", dir.path());
    println!("  exported: {} files", exported.len());
    if failed.get() > 0 {
        anyhow::bail!("{} entries failed to export", failed.get());
    }
    Ok(())
}

// ── `sealfs cat` ──────────────────────────────────────────────────────────────

fn cmd_cat(
    drive: &Arc<Drive>,
    path: &str,
    settings: &sealfs_core::config::ReaderSettings,
    verify: bool,
) -> Result<()> {
    let mut file = resolve(drive, path)?;
    if !file.is_file() {
        anyhow::bail!("not a file: /{path}");
    }
    if verify && file.chunk_size()? > 0 {
        file.set_integrity(true, None)?;
    }
    let mut reader = CachedReader::new(file, settings).context("opening reader")?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    std::io::copy(&mut reader, &mut out).with_context(|| format!("reading /{path}"))?;
    out.flush()?;
    reader.close();
    Ok(())
}

// ── `sealfs rm` / `cp` / `mv` / `rename` ──────────────────────────────────────

fn tree_options<'a>(failed: &'a Cell<usize>, rename: bool) -> TreeOptions<'a> {
    TreeOptions {
        auto_rename: rename.then(|| {
            Box::new(auto_rename) as Box<dyn Fn(&VirtualFile) -> SealResult<String> + 'a>
        }),
        auto_rename_folders: rename,
        on_failed: Some(Box::new(move |file: &VirtualFile, e: &SealError| {
            failed.set(failed.get() + 1);
            let name = file.path().unwrap_or_else(|_| file.real_file().path());
            eprintln!("  failed: {name}: {e}");
        })),
        on_progress: None,
    }
}

fn cmd_rm(drive: &Arc<Drive>, paths: &[String]) -> Result<()> {
    let files = resolve_all(drive, paths)?;
    let commander = FileCommander::from_settings(&Default::default());
    let failed = Cell::new(0usize);
    let deleted = commander.delete_files(&files, &mut tree_options(&failed, false));
    println!("Deleted {deleted} entries");
    if failed.get() > 0 {
        anyhow::bail!("{} entries could not be deleted", failed.get());
    }
    Ok(())
}

fn cmd_copy(
    drive: &Arc<Drive>,
    sources: &[String],
    dest: &str,
    rename: bool,
    is_move: bool,
) -> Result<()> {
    let files = resolve_all(drive, sources)?;
    let dir = resolve_dir(drive, dest)?;
    let commander = FileCommander::from_settings(&Default::default());
    let failed = Cell::new(0usize);
    let mut options = tree_options(&failed, rename);
    let count = if is_move {
        commander.move_files(&files, &dir, &mut options)
    } else {
        commander.copy_files(&files, &dir, &mut options)
    };
    drop(options);
    println!("{} {count} entries", if is_move { "Moved" } else { "Copied" });
    if failed.get() > 0 {
        anyhow::bail!("{} entries failed", failed.get());
    }
    Ok(())
}

fn cmd_rename(drive: &Arc<Drive>, path: &str, new_name: &str) -> Result<()> {
    if new_name.contains('/') {
        anyhow::bail!("new name must not contain '/': {new_name}");
    }
    let mut file = resolve(drive, path)?;
    if file.parent().is_none() {
        anyhow::bail!("cannot rename the drive root");
    }
    file.rename(new_name)
        .with_context(|| format!("renaming /{path} to {new_name}"))?;
    Ok(())
}

// ── `sealfs auth` ─────────────────────────────────────────────────────────────

fn auth_file(drive: &Arc<Drive>, file: Option<&Path>) -> Result<RealFileRef> {
    match file {
        Some(path) => Ok(LocalFile::shared(path)),
        None => Ok(drive.auth_file()?),
    }
}

fn cmd_auth(drive: &Arc<Drive>, action: &AuthAction) -> Result<()> {
    match action {
        AuthAction::Id => {
            println!("{}", drive.auth_id()?);
        }
        AuthAction::Export { auth_id, file } => {
            let target = auth_file(drive, file.as_deref())?;
            let config = drive
                .export_auth_file(auth_id, &target)
                .context("exporting authorization")?;
            println!("Wrote auth file {}", target.path());
            println!(
                "  nonces: {}..{} handed to {auth_id}",
                config.start_nonce, config.max_nonce
            );
        }
        AuthAction::Import { file } => {
            let source = auth_file(drive, file.as_deref())?;
            drive
                .import_auth_file(&source)
                .with_context(|| format!("importing {}", source.path()))?;
            println!("Device authorized");
        }
        AuthAction::Revoke => {
            drive.revoke_authorization()?;
            println!("Authorization revoked; this device can no longer write to the drive");
        }
    }
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealfs_core::config::DriveSettings;
    use sealfs_sequence::MemorySequencer;

    fn drive(dir: &Path) -> Arc<Drive> {
        let settings = DriveSettings {
            kdf_iterations: 16,
            ..Default::default()
        };
        Drive::create(
            LocalFile::shared(dir.join("vault")),
            &SecretString::from("pw"),
            Arc::new(MemorySequencer::new()),
            settings,
        )
        .unwrap()
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/docs//2024/./a.txt"), vec!["docs", "2024", "a.txt"]);
        assert!(split_path("").is_empty());
        assert!(split_path("/").is_empty());
    }

    #[test]
    fn test_mkdir_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let drive = drive(dir.path());
        cmd_mkdir(&drive, "docs/2024").unwrap();
        cmd_mkdir(&drive, "/docs/2024/").unwrap();

        let found = resolve_dir(&drive, "docs/2024").unwrap();
        assert_eq!(found.name().unwrap(), "2024");
        assert!(resolve(&drive, "docs/missing").is_err());
        assert!(resolve_dir(&drive, "").unwrap().parent().is_none());
    }

    #[test]
    fn test_rename_rejects_separator() {
        let dir = tempfile::tempdir().unwrap();
        let drive = drive(dir.path());
        cmd_mkdir(&drive, "a").unwrap();
        assert!(cmd_rename(&drive, "a", "b/c").is_err());
        cmd_rename(&drive, "a", "b").unwrap();
        assert!(resolve(&drive, "b").is_ok());
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
