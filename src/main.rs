use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use foldermerge_lib::commands::{self, settings};
use foldermerge_lib::{AppEvent, AppState, ConflictPolicy, RunSummary};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "foldermerge", version)]
#[command(about = "Merge folders from several sources into one destination without duplicates", long_about = None)]
struct Cli {
    /// 配置目录，默认为系统配置目录下的 foldermerge
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge source folders into the destination (Ctrl-C pauses)
    Run {
        /// Source folder, repeatable
        #[arg(long = "source", required = true)]
        sources: Vec<PathBuf>,
        /// Destination folder
        #[arg(long)]
        dest: PathBuf,
        /// Only these extensions, comma separated (e.g. jpg,png)
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },
    /// Merge same-named folders inside the destination (Photos + Photos_bak)
    Consolidate {
        dest: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show or change settings
    Config {
        #[arg(long, value_enum)]
        conflict_policy: Option<PolicyArg>,
        #[arg(long)]
        log_level: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PolicyArg {
    Rename,
    Skip,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Rename => ConflictPolicy::Rename,
            PolicyArg::Skip => ConflictPolicy::Skip,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.unwrap_or_else(AppState::default_config_dir);
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("无法创建配置目录 {}", config_dir.display()))?;
    let _guard = foldermerge_lib::logging::init_logging(&config_dir);

    let (state, events) = AppState::new(config_dir)?;

    let result = match cli.command {
        Commands::Run { sources, dest, ext } => run(&state, events, sources, dest, ext).await,
        Commands::Consolidate { dest, yes } => consolidate(&state, events, dest, yes).await,
        Commands::Config {
            conflict_policy,
            log_level,
        } => configure(&state, conflict_policy, log_level).await,
    };

    state.cleanup().await;
    result
}

fn path_args(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

async fn run(
    state: &AppState,
    mut events: mpsc::Receiver<AppEvent>,
    sources: Vec<PathBuf>,
    dest: PathBuf,
    ext: Vec<String>,
) -> anyhow::Result<()> {
    let sources = path_args(&sources);
    let dest = dest.display().to_string();

    let run_id = commands::start_process(state, sources.clone(), dest.clone(), ext.clone())
        .await
        .map_err(|e| anyhow!(e))?;
    println!("任务 {} 已开始，按 Ctrl-C 暂停", run_id);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return Err(anyhow!("事件通道已关闭"));
                };
                match event {
                    AppEvent::ProgressUpdate(p) => {
                        println!(
                            "[{}] {} (已扫描 {}, 已复制 {}, 重复 {})",
                            p.phase, p.current_item_label, p.stats.scanned, p.stats.copied, p.stats.duplicates
                        );
                    }
                    AppEvent::ProcessComplete(summary) => {
                        print_summary(&summary);
                        if let Some(error) = summary.error {
                            return Err(anyhow!(error));
                        }
                        if !summary.paused {
                            return Ok(());
                        }
                        if !prompt_confirm("已暂停，是否继续?", Some(true)).await? {
                            println!("已退出，下次可使用相同参数重新开始");
                            return Ok(());
                        }
                        commands::resume_process(state, sources.clone(), dest.clone(), ext.clone())
                            .await
                            .map_err(|e| anyhow!(e))?;
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = commands::pause_process(state).await;
            }
        }
    }
}

async fn consolidate(
    state: &AppState,
    mut events: mpsc::Receiver<AppEvent>,
    dest: PathBuf,
    yes: bool,
) -> anyhow::Result<()> {
    let dest = dest.display().to_string();
    commands::merge_folders(state, dest.clone())
        .await
        .map_err(|e| anyhow!(e))?;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(AppEvent::MergeConfirmation { groups }) => {
                        for group in &groups {
                            println!("{}:", group.name);
                            for (i, folder) in group.folders.iter().enumerate() {
                                let mark = if i == 0 { "<-" } else { "  " };
                                println!("  {} {}", mark, folder.display());
                            }
                        }
                        if !yes && !prompt_confirm("合并以上目录?", Some(false)).await? {
                            return Ok(());
                        }
                        commands::confirm_merge(state, dest.clone(), groups)
                            .await
                            .map_err(|e| anyhow!(e))?;
                    }
                    Some(AppEvent::MergeComplete { stats, error }) => {
                        println!(
                            "整理完成: 复制 {}, 重复 {}, {} 字节",
                            stats.copied, stats.duplicates, stats.size_copied_bytes
                        );
                        return match error {
                            Some(e) => Err(anyhow!(e)),
                            None => Ok(()),
                        };
                    }
                    Some(_) => {}
                    None => return Err(anyhow!("事件通道已关闭")),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = commands::pause_process(state).await;
            }
        }
    }
}

async fn configure(
    state: &AppState,
    conflict_policy: Option<PolicyArg>,
    log_level: Option<String>,
) -> anyhow::Result<()> {
    let merge = settings::set_merge_config(state, conflict_policy.map(Into::into), None, None)
        .await
        .map_err(|e| anyhow!(e))?;
    let log = settings::set_log_config(state, None, log_level, None)
        .await
        .map_err(|e| anyhow!(e))?;

    println!("配置目录: {}", state.config_dir.display());
    println!("merge: {}", serde_json::to_string_pretty(&merge)?);
    println!("log: {}", serde_json::to_string_pretty(&log)?);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for entry in &summary.report {
        println!(
            "{} -> {}: {}",
            entry.source_path.display(),
            entry.destination_path.display(),
            entry.status
        );
    }
    let stats = summary.stats;
    println!(
        "{}: 扫描 {}, 复制 {}, 重复 {}, {} 字节",
        if summary.paused { "已暂停" } else { "完成" },
        stats.scanned,
        stats.copied,
        stats.duplicates,
        stats.size_copied_bytes
    );
}

async fn prompt_confirm(prompt: &str, default: Option<bool>) -> std::io::Result<bool> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let hint = match default {
            Some(true) => "(Y/n)",
            Some(false) | None => "(y/N)",
        };
        stdout.write_all(format!("{} {}: ", prompt, hint).as_bytes()).await?;
        stdout.flush().await?;

        let Some(input) = lines.next_line().await? else {
            return Ok(default.unwrap_or(false));
        };
        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
