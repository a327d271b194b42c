//! Hive - 多 Agent 路由与分发引擎
//!
//! 入口：初始化日志、按配置构建引擎，并运行行式 REPL。
//! 普通输入交给意图分类自动分派；以 / 开头的是命令（输入 /help 查看）。

use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use hive::config::{load_config, reload_config, AppConfig};
use hive::{observability, EngineBuilder, Supervisor};

const DEFAULT_HISTORY_LIMIT: usize = 10;

const HELP: &str = "\
命令：
  <文本>                 自动识别意图并分派
  /agent <key> <文本>    指定 Agent 执行
  /agents                列出已注册的 Agent
  /history [n]           最近 n 条任务历史（默认 10）
  /stats                 任务统计
  /traces [task_id]      追踪记录
  /events [type]         事件记录
  /metrics [name]        指标序列
  /export [path]         导出遥测快照
  /reload                重新加载配置并重建引擎（清空历史与遥测）
  /help                  显示帮助
  /quit                  退出";

/// REPL 输入解析结果
#[derive(Debug, Clone, PartialEq)]
enum ReplCommand {
    Task(String),
    Agent { key: String, input: String },
    Agents,
    History(usize),
    Stats,
    Traces(Option<String>),
    Events(Option<String>),
    Metrics(Option<String>),
    Export(Option<PathBuf>),
    Reload,
    Help,
    Quit,
    Invalid(String),
}

fn parse_line(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ReplCommand::Task(line.to_string()));
    };
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (rest, ""),
    };
    let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
    let command = match cmd {
        "agent" => match arg.split_once(char::is_whitespace) {
            Some((key, input)) if !input.trim().is_empty() => ReplCommand::Agent {
                key: key.to_string(),
                input: input.trim().to_string(),
            },
            _ => ReplCommand::Invalid("用法：/agent <key> <文本>".to_string()),
        },
        "agents" => ReplCommand::Agents,
        "history" if arg.is_empty() => ReplCommand::History(DEFAULT_HISTORY_LIMIT),
        "history" => match arg.parse() {
            Ok(n) => ReplCommand::History(n),
            Err(_) => ReplCommand::Invalid(format!("不是有效的数量：{}", arg)),
        },
        "stats" => ReplCommand::Stats,
        "traces" => ReplCommand::Traces(opt(arg)),
        "events" => ReplCommand::Events(opt(arg)),
        "metrics" => ReplCommand::Metrics(opt(arg)),
        "export" => ReplCommand::Export(opt(arg).map(PathBuf::from)),
        "reload" => ReplCommand::Reload,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("未知命令：/{}（输入 /help 查看）", other)),
    };
    Some(command)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("序列化失败：{}", e),
    }
}

async fn run_task(supervisor: &Supervisor, input: &str, agent: Option<&str>) {
    match supervisor.execute_task(input, agent).await {
        Ok(result) => print_json(&result),
        Err(e) => eprintln!("错误：{}", e),
    }
}

fn build_engine(cfg: AppConfig) -> anyhow::Result<Supervisor> {
    EngineBuilder::new(cfg).build().context("Failed to build engine")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let mut supervisor = build_engine(cfg)?;

    println!("Hive 已启动，输入 /help 查看命令。");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let Some(command) = parse_line(&line) else {
            continue;
        };
        match command {
            ReplCommand::Task(input) => run_task(&supervisor, &input, None).await,
            ReplCommand::Agent { key, input } => run_task(&supervisor, &input, Some(&key)).await,
            ReplCommand::Agents => print_json(&supervisor.agents()),
            ReplCommand::History(n) => print_json(&supervisor.get_task_history(n)),
            ReplCommand::Stats => print_json(&supervisor.get_statistics()),
            ReplCommand::Traces(id) => print_json(&supervisor.get_traces(id.as_deref())),
            ReplCommand::Events(kind) => print_json(&supervisor.get_events(kind.as_deref())),
            ReplCommand::Metrics(name) => print_json(&supervisor.get_metrics(name.as_deref())),
            ReplCommand::Export(path) => match supervisor.export_to_file(path.as_deref()) {
                Ok(path) => println!("已导出：{}", path.display()),
                Err(e) => eprintln!("导出失败：{}", e),
            },
            ReplCommand::Reload => {
                // 新配置无法加载或组装时保留当前引擎
                let rebuilt = reload_config(config_path.clone())
                    .map_err(anyhow::Error::from)
                    .and_then(build_engine);
                match rebuilt {
                    Ok(engine) => {
                        supervisor = engine;
                        println!("配置已重新加载。");
                    }
                    Err(e) => eprintln!("重新加载失败：{:#}", e),
                }
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => break,
            ReplCommand::Invalid(msg) => eprintln!("{}", msg),
        }
    }

    Ok(())
}
