//! Committer daemon: wires the store, the rollup state and the pipeline
//! under the task supervisor, then waits for shutdown or a fatal panic.

use std::{fs, path::Path, path::PathBuf, process, sync::Arc, time::Duration};

use anyhow::Context;
use argh::FromArgs;
use tracing::*;
use vela_chain::{Blockchain, MemSnapshotCache, SequentialHashTree, StateDb};
use vela_committer::{Committer, CommitterConfig};
use vela_db::mem::MemDatabase;
use vela_tasks::TaskSupervisor;

/// Vela block-production committer.
#[derive(FromArgs)]
struct Args {
    /// path to the TOML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn load_configuration(path: &Path) -> anyhow::Result<CommitterConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).context("parsing config")
}

fn default_configuration() -> CommitterConfig {
    CommitterConfig::new(vec![16, 32, 64])
}

fn main() {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e:?}");
        process::exit(1);
    }
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    vela_common::logging::init();

    let config = match args.config.as_deref() {
        Some(path) => load_configuration(path)?,
        None => default_configuration(),
    };
    info!(?config, "starting committer");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vela-rt")
        .build()
        .expect("init: build rt");

    let db = Arc::new(MemDatabase::new());
    let state = StateDb::new(
        Arc::new(MemSnapshotCache::new()),
        Box::new(SequentialHashTree::new()),
        Box::new(SequentialHashTree::new()),
    );
    let bc = Arc::new(Blockchain::new(db, state).context("opening chain")?);

    let supervisor = TaskSupervisor::new(rt.handle().clone());
    supervisor.listen_for_signals();

    let committer = Committer::new(config, bc).context("building committer")?;
    committer
        .start(&supervisor.executor())
        .context("starting committer")?;

    if let Err(e) = supervisor.monitor(Some(Duration::from_secs(5))) {
        error!(err = %e, "critical task failed");
        anyhow::bail!("committer halted: {e}");
    }

    info!("exiting");
    Ok(())
}
