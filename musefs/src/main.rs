use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use musefs::catalog::lister::{Lister, ListerConfig};
use musefs::catalog::resolve_entries;
use musefs::catalog::tags::SymphoniaResolver;
use musefs::fuse::mount::mount_unprivileged;
use musefs::vfs::config::{DEFAULT_FS_NAME, VfsConfig};
use musefs::vfs::fs::MuseFs;
use musefs::vfs::tree::{FileType, Node};

#[derive(Parser)]
#[command(name = "musefs", version, about = "Read-only FUSE view of a tagged audio collection")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the collection and mount it via FUSE.
    Mount(MountArgs),
    /// Index the collection and list one virtual directory.
    Ls(BrowseArgs),
    /// Index the collection and dump the catalog entry behind a virtual file as JSON.
    Show(BrowseArgs),
}

#[derive(Args)]
struct CatalogArgs {
    /// Directory to scan for audio files. Repeat for several roots.
    #[arg(short, long = "path", value_name = "DIR", required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct MountArgs {
    /// Directory to mount the filesystem on.
    #[arg(value_name = "MOUNT_POINT")]
    mount_point: PathBuf,

    #[command(flatten)]
    catalog: CatalogArgs,

    /// Source name shown in the mount table.
    #[arg(long, default_value = DEFAULT_FS_NAME)]
    name: String,

    /// Allow other users to access the mount.
    #[arg(long)]
    allow_other: bool,

    /// Kernel entry/attribute cache lifetime in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    ttl: u64,
}

#[derive(Args)]
struct BrowseArgs {
    /// Virtual path, e.g. "artist/Low".
    #[arg(value_name = "VPATH", default_value = "/")]
    vpath: String,

    #[command(flatten)]
    catalog: CatalogArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "musefs=info".to_string()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Mount(args) => mount_cmd(args).await?,
        Command::Ls(args) => ls_cmd(args).await?,
        Command::Show(args) => show_cmd(args).await?,
    }

    Ok(())
}

/// Walk the roots, read tags and build the tree. All of it is blocking I/O.
async fn build_fs(catalog: CatalogArgs, config: VfsConfig) -> anyhow::Result<MuseFs> {
    let fs = tokio::task::spawn_blocking(move || -> anyhow::Result<MuseFs> {
        for root in &catalog.paths {
            if !root.is_dir() {
                anyhow::bail!("not a directory: {}", root.display());
            }
        }
        let records = Lister::new(&catalog.paths, &ListerConfig::default()).list()?;
        info!(files = records.len(), "catalog listed");
        let entries = resolve_entries(records, &SymphoniaResolver);
        let (fs, _report) = MuseFs::from_entries(entries, config);
        Ok(fs)
    })
    .await??;
    Ok(fs)
}

async fn mount_cmd(args: MountArgs) -> anyhow::Result<()> {
    if !args.mount_point.exists() {
        std::fs::create_dir_all(&args.mount_point)?;
    }
    if !args.mount_point.is_dir() {
        anyhow::bail!("mount point must be a directory");
    }

    let ttl = Duration::from_secs(args.ttl);
    let config = VfsConfig::default()
        .entry_ttl(ttl)
        .attr_ttl(ttl)
        .fs_name(args.name)
        .allow_other(args.allow_other);

    let fs = build_fs(args.catalog, config.clone()).await?;
    let handle = mount_unprivileged(fs, &config, &args.mount_point).await?;

    println!("mounted at {}", args.mount_point.display());
    tokio::signal::ctrl_c().await?;
    println!("unmounting...");
    handle.unmount().await?;
    Ok(())
}

async fn ls_cmd(args: BrowseArgs) -> anyhow::Result<()> {
    let fs = build_fs(args.catalog, VfsConfig::default()).await?;
    match fs.lookup_path(&args.vpath)? {
        Node::Dir(dir) => {
            for entry in dir.entries() {
                match entry.kind {
                    FileType::Dir => println!("{}/", entry.name),
                    FileType::File => println!("{}", entry.name),
                }
            }
        }
        Node::File(file) => println!("{}", file.name),
    }
    Ok(())
}

async fn show_cmd(args: BrowseArgs) -> anyhow::Result<()> {
    let fs = build_fs(args.catalog, VfsConfig::default()).await?;
    match fs.lookup_path(&args.vpath)? {
        Node::File(file) => {
            println!("{}", serde_json::to_string_pretty(file.entry.as_ref())?);
            Ok(())
        }
        Node::Dir(_) => anyhow::bail!("{} is a directory", args.vpath),
    }
}
