//! Web 服务器主程序入口

use pagelingo::config::AppConfig;
use pagelingo::logging::init_tracing;
use pagelingo::orchestrator::Orchestrator;
use pagelingo::store::open_store;
use pagelingo::web::{AppState, WebServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;

    // 命令行参数覆盖配置文件和环境变量
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.web.bind_address = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --bind requires an address");
                    std::process::exit(1);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.web.port = match args[i + 1].parse() {
                        Ok(port) => port,
                        Err(_) => {
                            eprintln!("Error: Invalid port number");
                            std::process::exit(1);
                        }
                    };
                    i += 2;
                } else {
                    eprintln!("Error: --port requires a port number");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Error: Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    init_tracing(&config.log_level, config.no_color);
    tracing::info!("{}", config.summary());

    let store = open_store(&config).await?;
    let orchestrator = Orchestrator::with_default_providers(store, &config)?;

    let server = WebServer::new(config.web.clone(), AppState::new(orchestrator));
    server.start().await?;

    Ok(())
}

fn print_help() {
    println!("Pagelingo Web Server");
    println!();
    println!("USAGE:");
    println!("    pagelingo-web [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -b, --bind <ADDRESS>     Bind address [default: 127.0.0.1]");
    println!("    -p, --port <PORT>        Port number [default: 7080]");
    println!("    -h, --help               Print help information");
    println!();
    println!("ENDPOINTS:");
    println!("    GET  /                        Health check");
    println!("    POST /app/translate           Get or produce a translation");
    println!("    GET  /app/translations/:id    Read a stored translation");
    println!("    GET  /feed/                   RSS feed of fetched pages");
}
