use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use appmarket_artifact::{FsPackageStore, HttpResolver};
use appmarket_deployer::{HelmConfig, HelmDeployer};
use appmarket_pipeline::{DeploymentPipeline, DeploymentRequest, DeploymentService};
use appmarket_queue::{
  ChannelNotifier, DEFAULT_CAPACITY, DeployHandler, QueueConfig, TaskEvent, TaskQueue,
  final_event,
};
use appmarket_store::{ChartCatalog, ChartPolicy, ChartVersionRecord, Json, SqliteStore, TaskStatus};
use appmarket_values::Values;

/// Appmarket - deploy Helm charts through a durable task queue
#[derive(Parser)]
#[command(name = "appmarket")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.appmarket)
  #[arg(long, global = true, env = "APPMARKET_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Database URL (default: sqlite://<data-dir>/appmarket.db)
  #[arg(long, global = true, env = "APPMARKET_DATABASE_URL")]
  database_url: Option<String>,

  /// Maximum number of queued deployments
  #[arg(long, global = true, env = "APPMARKET_QUEUE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
  queue_capacity: usize,

  /// Seconds a single deployment may run before it is abandoned
  #[arg(long, global = true, env = "APPMARKET_DEPLOY_TIMEOUT_SECS", default_value_t = 600)]
  deploy_timeout_secs: u64,

  /// The helm executable
  #[arg(long, global = true, env = "APPMARKET_HELM_BIN", default_value = "helm")]
  helm_bin: PathBuf,

  /// Log filter, e.g. `debug` or `appmarket_queue=trace` (overrides RUST_LOG)
  #[arg(long, global = true, env = "APPMARKET_LOG_LEVEL")]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Manage the chart catalog
  Chart {
    #[command(subcommand)]
    action: ChartAction,
  },

  /// Deploy a chart version and wait for the result
  Deploy {
    #[arg(long)]
    user: String,

    #[arg(long)]
    chart: String,

    #[arg(long)]
    version: String,

    /// Release name
    #[arg(long)]
    release: String,

    #[arg(long, default_value = "default")]
    namespace: String,

    /// JSON file with user values
    #[arg(long)]
    values: Option<PathBuf>,

    /// Pin the policy's fixed keys to the admin defaults
    #[arg(long)]
    quick: bool,
  },

  /// Show a task
  Task {
    task_id: String,

    /// Only show the task if it belongs to this user
    #[arg(long)]
    user: Option<String>,
  },

  /// List a user's tasks
  Tasks {
    #[arg(long)]
    user: String,
  },

  /// List a user's deployed instances
  Instances {
    #[arg(long)]
    user: String,
  },

  /// Uninstall a deployed instance
  Uninstall {
    instance_id: String,

    #[arg(long)]
    user: String,
  },
}

#[derive(Subcommand)]
enum ChartAction {
  /// Add or replace a chart version
  Add {
    #[arg(long)]
    chart: String,

    #[arg(long)]
    version: String,

    /// JSON file with the chart's default values
    #[arg(long)]
    values: Option<PathBuf>,

    /// Existing package on disk, used in place
    #[arg(long, conflicts_with = "package")]
    local_path: Option<PathBuf>,

    /// Package to copy into the data directory
    #[arg(long)]
    package: Option<PathBuf>,

    /// Download URL (repeatable, the first one is used)
    #[arg(long)]
    url: Vec<String>,

    #[arg(long, default_value = "")]
    app_version: String,

    #[arg(long, default_value = "")]
    digest: String,
  },

  /// Set the admin policy for a chart version
  Policy {
    #[arg(long)]
    chart: String,

    #[arg(long)]
    version: String,

    /// JSON policy: default_values, required_keys, visible_keys, fixed_keys
    #[arg(long)]
    file: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.log_level.as_deref())?;

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(run(cli))
}

fn init_tracing(level: Option<&str>) -> Result<()> {
  let filter = match level {
    Some(level) => EnvFilter::try_new(level).context("invalid log level")?,
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("appmarket=info")),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
  Ok(())
}

/// Everything a command needs, built from the global flags.
struct App {
  data_dir: PathBuf,
  store: Arc<SqliteStore>,
  queue_config: QueueConfig,
  helm: HelmConfig,
}

impl App {
  async fn open(cli: &Cli) -> Result<Self> {
    let data_dir = match &cli.data_dir {
      Some(dir) => dir.clone(),
      None => dirs::home_dir()
        .context("could not determine home directory")?
        .join(".appmarket"),
    };
    tokio::fs::create_dir_all(&data_dir)
      .await
      .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let database_url = cli
      .database_url
      .clone()
      .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("appmarket.db").display()));
    let store = SqliteStore::connect(&database_url)
      .await
      .with_context(|| format!("failed to open database: {database_url}"))?;

    Ok(Self {
      data_dir,
      store: Arc::new(store),
      queue_config: QueueConfig {
        capacity: cli.queue_capacity,
        deploy_timeout: Duration::from_secs(cli.deploy_timeout_secs),
      },
      helm: HelmConfig {
        binary: cli.helm_bin.clone(),
        create_namespace: true,
      },
    })
  }

  fn deployer(&self) -> Arc<HelmDeployer> {
    Arc::new(HelmDeployer::new(self.helm.clone()))
  }

  fn packages(&self) -> FsPackageStore {
    FsPackageStore::new(self.data_dir.join("charts"))
  }

  /// A queue plus its worker, already running, and the worker's events.
  async fn start_queue(
    &self,
    cancel: CancellationToken,
  ) -> Result<(TaskQueue, mpsc::UnboundedReceiver<TaskEvent>)> {
    let pipeline = DeploymentPipeline::new(
      self.store.clone(),
      self.store.clone(),
      Arc::new(HttpResolver::new()),
      self.deployer(),
    );

    let (queue, worker) = TaskQueue::new(self.store.clone(), self.queue_config.capacity);
    let recovered = queue
      .recover(self.queue_config.stale_after())
      .await
      .context("failed to recover tasks")?;
    if recovered > 0 {
      eprintln!("Marked {recovered} interrupted task(s) as failed");
    }

    let (tx, events) = mpsc::unbounded_channel();
    let worker = worker
      .with_handler(DeployHandler::new(pipeline, self.queue_config.deploy_timeout))
      .with_notifier(ChannelNotifier::new(tx));
    tokio::spawn(worker.start(cancel));
    Ok((queue, events))
  }

  /// A queue handle for lookups only. No worker runs behind it.
  fn lookup_queue(&self) -> TaskQueue {
    TaskQueue::new(self.store.clone(), 1).0
  }
}

async fn run(cli: Cli) -> Result<()> {
  let app = App::open(&cli).await?;

  match cli.command {
    Commands::Chart { action } => match action {
      ChartAction::Add {
        chart,
        version,
        values,
        local_path,
        package,
        url,
        app_version,
        digest,
      } => {
        let mut record = ChartVersionRecord::new(&chart, &version);
        record.app_version = app_version;
        record.digest = digest;
        record.urls = Json(url);
        if let Some(path) = values {
          record.default_values = Json(read_values(&path).await?);
        }

        let local = match (local_path, package) {
          (Some(path), _) => Some(path),
          (None, Some(package)) => Some(
            app
              .packages()
              .import(&chart, &version, &package)
              .await
              .with_context(|| format!("failed to import package: {}", package.display()))?,
          ),
          (None, None) => None,
        };
        record.local_path = local.map(|p| p.display().to_string());

        if record.local_path.is_none() && record.urls.is_empty() {
          bail!("a chart version needs --local-path, --package or at least one --url");
        }

        app.store.put_version(&record).await?;
        info!(chart_id = %chart, version = %version, "chart version saved");
        print_json(&record)?;
      }
      ChartAction::Policy {
        chart,
        version,
        file,
      } => {
        let policy = read_policy(&file, &chart, &version).await?;
        app.store.put_policy(&policy).await?;
        info!(chart_id = %chart, version = %version, "chart policy saved");
        print_json(&policy)?;
      }
    },

    Commands::Deploy {
      user,
      chart,
      version,
      release,
      namespace,
      values,
      quick,
    } => {
      let mut request = DeploymentRequest::new(&user, chart, version, release, namespace);
      if let Some(path) = values {
        request.user_values = read_values(&path).await?;
      }
      request.quick_mode = quick;

      let cancel = CancellationToken::new();
      let (queue, mut events) = app.start_queue(cancel.clone()).await?;

      let task = queue.enqueue(&user, &request).await?;
      eprintln!("Enqueued task {}", task.task_id);

      let event = final_event(&mut events, &task.task_id, app.queue_config.stale_after()).await;
      cancel.cancel();
      let Some(event) = event else {
        bail!("gave up waiting for task {}", task.task_id);
      };

      let task = queue.get_task(&task.task_id).await?;
      print_json(&task)?;
      match event {
        TaskEvent::Skipped { error, .. } => bail!("deployment was not run: {error}"),
        _ if task.status == TaskStatus::Failed => bail!("deployment failed: {}", task.result),
        TaskEvent::Failed { error, .. } => bail!("deployment failed: {error}"),
        _ => {}
      }
    }

    Commands::Task { task_id, user } => {
      let queue = app.lookup_queue();
      let task = match user {
        Some(user) => queue.get_task_for_user(&task_id, &user).await?,
        None => queue.get_task(&task_id).await?,
      };
      print_json(&task)?;
    }

    Commands::Tasks { user } => {
      let tasks = app.lookup_queue().list_tasks(&user).await?;
      print_json(&tasks)?;
    }

    Commands::Instances { user } => {
      let service = DeploymentService::new(app.store.clone(), app.deployer());
      print_json(&service.list_instances(&user).await?)?;
    }

    Commands::Uninstall { instance_id, user } => {
      let service = DeploymentService::new(app.store.clone(), app.deployer());
      service
        .delete_instance(&instance_id, &user)
        .await
        .context("uninstall failed")?;
      eprintln!("Uninstalled instance {instance_id}");
    }
  }

  Ok(())
}

async fn read_values(path: &Path) -> Result<Values> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read values file: {}", path.display()))?;
  let value: serde_json::Value = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse values file: {}", path.display()))?;

  match value {
    serde_json::Value::Object(values) => Ok(values),
    _ => bail!("values file must contain a JSON object: {}", path.display()),
  }
}

async fn read_policy(path: &Path, chart: &str, version: &str) -> Result<ChartPolicy> {
  let mut fields = read_values(path).await?;
  fields.insert("chart_id".into(), chart.into());
  fields.insert("version".into(), version.into());

  serde_json::from_value(serde_json::Value::Object(fields))
    .with_context(|| format!("invalid policy file: {}", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
