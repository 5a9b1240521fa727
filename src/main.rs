//! zubfs CLI - inspect committed trees through the read-only filesystem layer

use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use clap::{Args, Parser, Subcommand};
use nix::fcntl::OFlag;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zubfs::ops::commit;
use zubfs::vfs::{FileKind, FsOptions, PathFs, TimestampSource, TreeFs, WorktreeRedirect};
use zubfs::{FsError, FsResult, Repo};

/// read size used when streaming file content to stdout
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "zubfs")]
#[command(about = "serve committed trees as lazily materialized read-only filesystems")]
#[command(version)]
struct Cli {
    /// repository path
    #[arg(short, long, default_value = ".", env = "ZUBFS_REPO", global = true)]
    repo: PathBuf,

    /// log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// how to open a revision
#[derive(Args)]
struct MountArgs {
    /// revision to open (ref, tag, hash or prefix, with ~N / ^ suffixes)
    rev: String,

    /// decode blobs at open instead of first read
    #[arg(long)]
    eager: bool,

    /// spool blobs to files instead of memory
    #[arg(long)]
    disk: bool,

    /// spool directory (default: <repo>/tmp/spool)
    #[arg(long)]
    spool_dir: Option<PathBuf>,

    /// report the commit timestamp for every node
    #[arg(long)]
    commit_times: bool,

    /// host directory the tree would be mounted on (worktree redirect)
    #[arg(long, requires = "admin_dir")]
    mount_point: Option<PathBuf>,

    /// worktree admin directory the synthetic .git points at
    #[arg(long, requires = "mount_point")]
    admin_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new repository
    Init {
        /// path to create repository at
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// commit a directory to a ref
    Commit {
        /// source directory to commit
        source: PathBuf,

        /// ref name to commit to
        #[arg(short = 'r', long)]
        ref_name: String,

        /// commit message
        #[arg(short, long)]
        message: Option<String>,

        /// author name
        #[arg(short, long)]
        author: Option<String>,
    },

    /// list refs
    Refs {
        /// glob pattern to filter refs
        pattern: Option<String>,
    },

    /// point a tag at a revision
    Tag {
        /// tag name
        name: String,

        /// revision to tag
        #[arg(default_value = "main")]
        rev: String,
    },

    /// delete a branch ref
    DeleteRef {
        /// ref name to delete
        ref_name: String,
    },

    /// resolve a revision to a commit hash
    RevParse {
        /// revision to resolve
        rev: String,

        /// output short hash (first 12 chars)
        #[arg(long)]
        short: bool,
    },

    /// list a directory of a revision
    Ls {
        #[command(flatten)]
        mount: MountArgs,

        /// directory within the tree
        #[arg(default_value = "")]
        path: String,
    },

    /// print a file of a revision
    Cat {
        #[command(flatten)]
        mount: MountArgs,

        /// file within the tree
        path: String,
    },

    /// show attributes of a path
    Stat {
        #[command(flatten)]
        mount: MountArgs,

        /// path within the tree
        #[arg(default_value = "")]
        path: String,
    },

    /// print a symlink target
    Readlink {
        #[command(flatten)]
        mount: MountArgs,

        /// symlink within the tree
        path: String,
    },

    /// list extended attributes, or print one
    Xattr {
        #[command(flatten)]
        mount: MountArgs,

        /// path within the tree
        path: String,

        /// attribute to print
        name: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] zubfs::Error),

    #[error("{path}: {source}")]
    Fs { path: String, source: FsError },

    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),
}

/// attach the path to a per-call filesystem status
fn at<T>(path: &str, result: FsResult<T>) -> Result<T, CliError> {
    result.map_err(|source| CliError::Fs {
        path: format!("/{}", path.trim_start_matches('/')),
        source,
    })
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Init { path } => {
            Repo::init(&path)?;
            println!("initialized zubfs repository at {}", path.display());
        }

        Commands::Commit {
            source,
            ref_name,
            message,
            author,
        } => {
            let repo = Repo::open(&cli.repo)?;
            let hash = commit(&repo, &source, &ref_name, message.as_deref(), author.as_deref())?;
            println!("{}", hash);
        }

        Commands::Refs { pattern } => {
            let repo = Repo::open(&cli.repo)?;
            let refs = match pattern {
                Some(pattern) => zubfs::list_refs_matching(&repo, &pattern)?,
                None => zubfs::list_refs(&repo)?,
            };

            for ref_name in refs {
                let hash = zubfs::read_ref(&repo, &ref_name)?;
                println!("{} {}", hash, ref_name);
            }
        }

        Commands::Tag { name, rev } => {
            let repo = Repo::open(&cli.repo)?;
            let hash = zubfs::resolve_revision(&repo, &rev)?;
            zubfs::write_tag(&repo, &name, &hash)?;
            println!("{} {}", hash, name);
        }

        Commands::DeleteRef { ref_name } => {
            let repo = Repo::open(&cli.repo)?;
            let _lock = repo.lock()?;
            zubfs::delete_ref(&repo, &ref_name)?;
        }

        Commands::RevParse { rev, short } => {
            let repo = Repo::open(&cli.repo)?;
            let hash = zubfs::resolve_revision(&repo, &rev)?;
            if short {
                println!("{}", &hash.to_hex()[..12]);
            } else {
                println!("{}", hash);
            }
        }

        Commands::Ls { mount, path } => {
            let fs = open_fs(&cli.repo, mount)?;
            for entry in at(&path, fs.open_dir(&path))? {
                println!(
                    "{} {:06o} {:>8} {}",
                    kind_char(entry.kind()),
                    entry.mode,
                    entry.ino,
                    entry.name
                );
            }
        }

        Commands::Cat { mount, path } => {
            let fs = open_fs(&cli.repo, mount)?;
            let handle = at(&path, fs.open(&path, OFlag::O_RDONLY))?;

            let mut stdout = io::stdout().lock();
            let mut offset = 0u64;
            loop {
                let chunk = at(&path, handle.read(offset, CHUNK_SIZE))?;
                if chunk.is_empty() {
                    break;
                }
                stdout.write_all(&chunk)?;
                offset += chunk.len() as u64;
            }
            stdout.flush()?;
            handle.release();
        }

        Commands::Stat { mount, path } => {
            let fs = open_fs(&cli.repo, mount)?;
            let attr = at(&path, fs.get_attr(&path))?;
            let mtime = attr
                .mtime
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            println!("path   /{}", path.trim_matches('/'));
            println!("kind   {:?}", attr.kind);
            println!("mode   {:06o}", attr.mode);
            println!("size   {}", attr.size);
            println!("ino    {}", attr.ino);
            println!("nlink  {}", attr.nlink);
            println!("mtime  {}", mtime);
        }

        Commands::Readlink { mount, path } => {
            let fs = open_fs(&cli.repo, mount)?;
            let target = at(&path, fs.read_link(&path))?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(target.as_bytes())?;
            stdout.write_all(b"\n")?;
        }

        Commands::Xattr { mount, path, name } => {
            let fs = open_fs(&cli.repo, mount)?;
            match name {
                Some(name) => {
                    let value = at(&path, fs.get_xattr(&path, &name))?;
                    println!("{}", String::from_utf8_lossy(&value));
                }
                None => {
                    for name in at(&path, fs.list_xattr(&path))? {
                        println!("{}", name);
                    }
                }
            }
        }
    }

    Ok(())
}

/// open a revision with repository defaults overridden by flags
fn open_fs(repo_path: &Path, args: MountArgs) -> Result<TreeFs, CliError> {
    let repo = Repo::open(repo_path)?;
    let options = args.options(&repo);
    Ok(TreeFs::mount(Arc::new(repo), &args.rev, options)?)
}

impl MountArgs {
    fn options(&self, repo: &Repo) -> FsOptions {
        let mut options = repo.config().fs.clone();

        if self.eager {
            options.lazy = false;
        }
        if self.disk {
            options.disk = true;
        }
        if let Some(spool_dir) = &self.spool_dir {
            options.spool_dir = Some(spool_dir.clone());
        }
        if options.disk && options.spool_dir.is_none() {
            options.spool_dir = Some(repo.spool_path());
        }
        if self.commit_times {
            options.timestamps = TimestampSource::Commit;
        }
        if let (Some(mount_point), Some(admin_dir)) = (&self.mount_point, &self.admin_dir) {
            options.worktree = Some(WorktreeRedirect::new(mount_point, admin_dir));
        }

        options
    }
}

fn kind_char(kind: Option<FileKind>) -> char {
    match kind {
        Some(FileKind::Directory) => 'd',
        Some(FileKind::RegularFile) => '-',
        Some(FileKind::Symlink) => 'l',
        None => '?',
    }
}
