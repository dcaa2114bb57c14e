//! 命令行入口
//!
//! 抓取一个页面并返回它的译文，已有结果直接从存储读取。

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use pagelingo::artifact::{DerivedId, ResolvedTranslation};
use pagelingo::config::{AppConfig, StoreBackend};
use pagelingo::env::generate_env_docs;
use pagelingo::feed::{build_feed, FeedChannel};
use pagelingo::logging::init_tracing;
use pagelingo::orchestrator::{Orchestrator, ResolveRequest};
use pagelingo::store::{open_store, Page};

#[derive(Parser, Debug)]
#[command(name = "pagelingo", version, about = "Fetch web pages and cache their bilingual translations")]
struct Cli {
    /// 存储后端 (memory, redb, mongodb)
    #[arg(long, global = true)]
    store: Option<StoreBackend>,

    /// 存储文件路径（redb）
    #[arg(long, global = true)]
    store_path: Option<PathBuf>,

    /// 日志级别
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 获取或生成指定页面的译文
    Translate(TranslateArgs),
    /// 按 id 显示已保存的译文
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// 输出已抓取页面的 RSS 订阅源
    Feed {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// 列出支持的环境变量
    Env,
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// 页面 URL
    url: String,

    /// 目标语言，缺省使用配置中的默认语言
    #[arg(short, long)]
    language: Option<String>,

    /// 输出文件标题，缺省从 URL 推导
    #[arg(short = 'n', long = "name")]
    title: Option<String>,

    /// 抓取时绕过页面缓存
    #[arg(long)]
    no_cache: bool,

    /// 不写入输出目录
    #[arg(long)]
    no_save: bool,

    /// 输出目录
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// 以 JSON 输出完整结果
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Env = cli.command {
        print!("{}", generate_env_docs());
        return;
    }

    let mut config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };
    if let Some(backend) = cli.store {
        config.store.backend = backend;
    }
    if let Some(path) = cli.store_path {
        config.store.path = path;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_tracing(&config.log_level, config.no_color);
    tracing::debug!("{}", config.summary());

    if let Err(e) = run(cli.command, config).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(command: Commands, mut config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Translate(args) = &command {
        if let Some(dir) = &args.output_dir {
            config.pipeline.output_dir = dir.clone();
            config.validate()?;
        }
    }

    let store = open_store(&config).await?;

    match command {
        Commands::Translate(args) => {
            let orchestrator = Orchestrator::with_default_providers(store, &config)?;
            let mut request = ResolveRequest::new(args.url).allow_cache(!args.no_cache);
            if args.no_save {
                request = request.persist_to_sink(false);
            }
            if let Some(language) = args.language {
                request = request.language(language);
            }
            if let Some(title) = args.title {
                request = request.title(title);
            }

            let resolved = orchestrator.resolve(request).await?;
            print_resolved(&resolved, args.json)?;
        }
        Commands::Show { id, json } => {
            let orchestrator = Orchestrator::with_default_providers(store, &config)?;
            let resolved = orchestrator.get_existing(DerivedId(id)).await?;
            print_resolved(&resolved, json)?;
        }
        Commands::Feed { offset, limit } => {
            let xml = build_feed(store.as_ref(), &FeedChannel::default(), Page::new(offset, limit))
                .await?;
            print!("{}", xml);
        }
        Commands::Env => {}
    }

    Ok(())
}

fn print_resolved(resolved: &ResolvedTranslation, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(resolved)?);
        return Ok(());
    }

    match &resolved.output_file_path {
        Some(path) => eprintln!(
            "translation {} ({}) -> {}",
            resolved.derived.id,
            if resolved.from_store { "stored" } else { "new" },
            path.display()
        ),
        None => eprintln!(
            "translation {} ({})",
            resolved.derived.id,
            if resolved.from_store { "stored" } else { "new" }
        ),
    }
    println!("{}", resolved.derived.text);
    Ok(())
}
