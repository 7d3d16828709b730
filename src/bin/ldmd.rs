//! The executable shell around the `ldm` library: CLI parsing,
//! daemonization, logging initialization, privilege checks, and wiring
//! the library's [`Engine`] into a running process. `spec.md` section 1
//! treats all of this as an external collaborator of the core engine;
//! this binary is that collaborator.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{chdir, close, dup2, fork, setsid, ForkResult, Gid, Uid};

use ldm::error::TableKind;
use ldm::lifecycle::LifecycleCtx;
use ldm::mount_driver::SystemMountDriver;
use ldm::registry::Registry;
use ldm::table::TableCache;
use ldm::{Config, Engine, HookConfig, LdmError, Paths, Result, REGISTRY_CAPACITY};

/// Preserves the exact flag surface of `spec.md` section 6: `-d`,
/// `-u <uid>`, `-g <gid>`, `-r <path>`, `-h`. `-h`/`--help` and
/// unknown-flag rejection are clap's own defaults, which already match
/// the REDESIGN FLAG in `spec.md` section 9 (`-h` exits 0 explicitly,
/// unknown flags are a usage error with non-zero exit) without
/// hand-rolling flag parsing the way the original did.
#[derive(Parser, Debug)]
#[command(
    name = "ldmd",
    version,
    about = "Automounts removable block devices and exposes a control pipe for unmount requests"
)]
struct Cli {
    /// Run as the automount daemon.
    #[arg(short = 'd')]
    daemon: bool,

    /// Unprivileged uid mountpoints and hook invocations run as (mandatory with -d).
    #[arg(short = 'u', value_name = "UID")]
    uid: Option<u32>,

    /// Unprivileged gid mountpoints and hook invocations run as (mandatory with -d).
    #[arg(short = 'g', value_name = "GID")]
    gid: Option<u32>,

    /// Client mode: request an unmount of the device identified by <path>.
    #[arg(short = 'r', value_name = "PATH")]
    remove: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let result = match (cli.daemon, cli.remove) {
        (true, None) => run_daemon(cli.uid, cli.gid),
        (false, Some(path)) => run_client(&path),
        (true, Some(_)) => Err(LdmError::Usage(
            "-d and -r are mutually exclusive".to_string(),
        )),
        (false, None) => Err(LdmError::Usage(
            "exactly one of -d or -r is required".to_string(),
        )),
    };

    if let Err(err) = result {
        eprintln!("ldmd: {err}");
        std::process::exit(1);
    }
}

/// Client mode (`spec.md` section 6): open the control pipe, write `R`
/// followed by `<path>` with no trailing newline, close, exit. Does not
/// wait for a reply — the wire format is fire-and-forget (§4.8).
fn run_client(path: &Path) -> Result<()> {
    let mut pipe = std::fs::OpenOptions::new()
        .write(true)
        .open(Paths::CONTROL_PIPE)?;
    write!(pipe, "R{}", path.display())?;
    Ok(())
}

fn run_daemon(uid: Option<u32>, gid: Option<u32>) -> Result<()> {
    let uid = uid.ok_or_else(|| LdmError::Usage("-u <uid> is required with -d".to_string()))?;
    let gid = gid.ok_or_else(|| LdmError::Usage("-g <gid> is required with -d".to_string()))?;

    if !Uid::effective().is_root() {
        return Err(LdmError::NotSuperuser);
    }

    init_logging()?;
    daemonize()?;

    let guard = ldm::singleton::SingletonGuard::acquire(Paths::PID_FILE)?;
    let config = Config::new(Uid::from_raw(uid), Gid::from_raw(gid), HookConfig::default());

    let result = run_engine(&config);
    guard.release();
    result
}

fn run_engine(config: &Config) -> Result<()> {
    let mut tables = TableCache::new(&config.admin_table, &config.kernel_table);
    // Startup table-parse failure is fatal (`spec.md` section 7).
    tables.reload(TableKind::Admin)?;
    tables.reload(TableKind::Kernel)?;

    let ctx = LifecycleCtx {
        registry: Registry::new(REGISTRY_CAPACITY),
        tables,
        mount_root: config.mount_root.clone(),
        uid: config.uid,
        gid: config.gid,
        hook_helper: config.hook.helper.clone(),
        driver: Box::new(SystemMountDriver),
    };

    ldm::engine::install_signal_handlers()?;
    let mut engine = Engine::new(ctx, &config.control_pipe)?;
    engine.enumerate_existing();
    engine.run()
}

/// Classic double-fork: detach from the controlling terminal, become a
/// session leader, `chdir("/")`, and redirect stdio to `/dev/null`
/// (`SPEC_FULL.md`'s Daemonization module). The first intermediate
/// process exits immediately so the surviving child of the second fork
/// is not a session leader and can never reacquire a controlling tty.
fn daemonize() -> Result<()> {
    if matches!(unsafe { fork() }?, ForkResult::Parent { .. }) {
        std::process::exit(0);
    }
    setsid()?;
    if matches!(unsafe { fork() }?, ForkResult::Parent { .. }) {
        std::process::exit(0);
    }
    chdir("/")?;
    redirect_stdio_to_dev_null()
}

fn redirect_stdio_to_dev_null() -> Result<()> {
    let devnull = open("/dev/null", OFlag::O_RDWR, Mode::empty())?;
    for fd in 0..=2 {
        dup2(devnull, fd)?;
    }
    if devnull > 2 {
        close(devnull)?;
    }
    Ok(())
}

/// Installs a syslog backend under the fixed tag `"ldm"`
/// (`spec.md` section 6: "a fixed tag, no structured format") as the
/// `log` facade's implementation, so every component logs through
/// `log::info!`/`warn!`/`error!` without knowing how the bytes are
/// delivered. This is the only place the sink is named, keeping the
/// "syslog sink is out of scope" boundary from `spec.md` section 1 at
/// the binary rather than the library.
fn init_logging() -> Result<()> {
    use syslog::{BasicLogger, Facility, Formatter3164};

    let formatter = Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "ldm".to_string(),
        pid: std::process::id(),
    };
    let logger =
        syslog::unix(formatter).map_err(|err| LdmError::Io(std::io::Error::other(err)))?;
    log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
        .map_err(|err| LdmError::Io(std::io::Error::other(err)))?;
    log::set_max_level(log::LevelFilter::Info);
    Ok(())
}
