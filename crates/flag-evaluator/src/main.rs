//! 开关评估命令行工具
//!
//! 从 JSON 文件加载开关集合，对给定上下文评估一个开关并输出结果和前置开关事件。

use anyhow::{Context, Result};
use clap::Parser;
use flag_evaluator::{
    EvalResult, EvaluationContext, EvaluationDetail, ErrorKind, Evaluator, EvaluatorConfig,
    FlagStore,
};
use flag_shared::config::AppConfig;
use flag_shared::observability;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "评估功能开关", long_about = None)]
struct Cli {
    /// 开关定义文件：开关数组或 {"flags": {...}}
    #[arg(short, long, env = "FLAGS_FILE")]
    flags: PathBuf,

    /// 要评估的开关 key
    #[arg(short = 'k', long = "flag")]
    flag_key: String,

    /// 上下文 JSON，如 '{"key": "user-1"}'
    #[arg(short, long, conflicts_with = "context_file")]
    context: Option<String>,

    /// 从文件读取上下文 JSON
    #[arg(long)]
    context_file: Option<PathBuf>,

    /// 覆盖配置中的前置开关最大深度
    #[arg(long)]
    max_depth: Option<usize>,

    /// 格式化输出
    #[arg(short, long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("flag-eval").unwrap_or_else(|e| {
        eprintln!("配置加载失败，使用默认配置: {}", e);
        AppConfig::default()
    });
    observability::init(&config.observability)?;

    let store = FlagStore::new();
    let bundle = fs::read_to_string(&cli.flags)
        .with_context(|| format!("无法读取开关文件 {}", cli.flags.display()))?;
    let loaded = store.load_bundle_from_json(&bundle)?;
    info!("已加载 {} 个开关", loaded.len());

    let context = read_context(&cli)?;

    let max_depth = cli
        .max_depth
        .unwrap_or(config.evaluation.max_prerequisite_depth);
    let evaluator =
        Evaluator::with_config(EvaluatorConfig::new().with_max_prerequisite_depth(max_depth));

    let result = match store.get(&cli.flag_key) {
        Some(flag) => evaluator.evaluate(&flag, &context, &store),
        None => {
            warn!(flag_key = %cli.flag_key, "开关不存在");
            EvalResult {
                detail: EvaluationDetail::error(ErrorKind::FlagNotFound),
                events: Vec::new(),
            }
        }
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    Ok(())
}

fn read_context(cli: &Cli) -> Result<EvaluationContext> {
    let json = match (&cli.context, &cli.context_file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("无法读取上下文文件 {}", path.display()))?,
        (None, None) => anyhow::bail!("需要 --context 或 --context-file"),
    };

    EvaluationContext::from_json(&json).context("上下文 JSON 无效")
}
