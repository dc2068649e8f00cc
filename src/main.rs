use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Cell, Table as ComfyTable};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tsql2bridge::parser::split_statements;
use tsql2bridge::{AdapterConfig, ConnectionHandle, MemoryConnection, StatementResult, TemporalAdapter};

/// Interactive TSQL2 shell over the in-memory backend
#[derive(Parser, Debug)]
#[command(name = "tsql2")]
#[command(about = "TSQL2 temporal SQL shell", long_about = None)]
struct Args {
    /// Config file (defaults to ./tsql2bridge.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one statement and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Run a script of `;`-separated statements and exit
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Log every plan step (-v); RUST_LOG overrides
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn format_result(result: &StatementResult) -> String {
    match result {
        StatementResult::Count(n) => format!("OK, {n} row(s) affected\n"),
        StatementResult::Rows(set) => {
            if set.is_empty() {
                return "(0 rows)\n".to_string();
            }

            let mut table = ComfyTable::new();
            table.load_preset(UTF8_FULL);
            table.set_header(set.columns.iter().map(Cell::new));
            for row in &set.rows {
                table.add_row(row.values.iter().map(Cell::new));
            }

            format!("{table}\n({} rows)\n", set.len())
        }
    }
}

/// Runs one statement, printing its result or error. Returns false on error.
fn run_statement(adapter: &mut TemporalAdapter, sql: &str) -> bool {
    match adapter.execute(sql) {
        Ok(result) => {
            print!("{}", format_result(&result));
            true
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            false
        }
    }
}

fn run_script(adapter: &mut TemporalAdapter, script: &str) -> bool {
    let mut ok = true;
    for stmt in split_statements(script) {
        ok &= run_statement(adapter, stmt);
    }
    ok
}

fn print_help() {
    println!("Meta-commands:");
    println!("  \\q, \\quit          - Quit");
    println!("  \\d, \\dt            - List temporal tables");
    println!("  \\?, \\h, \\help      - Show this help");
    println!("\nStatements end with ';'. Temporal forms:");
    println!("  CREATE TABLE t (...) AS VALID STATE [AND TRANSACTION] | AS TRANSACTION");
    println!("  VALIDTIME [PERIOD [a, b)] SELECT|UPDATE|DELETE ...");
    println!("  NONSEQUENCED VALIDTIME SELECT ...   TRANSACTIONTIME SELECT ...");
    println!("  SELECT ... AS OF [VALID|TRANSACTION] <instant>");
}

fn repl(adapter: &mut TemporalAdapter) -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;

    let history_file = dirs::data_dir().map(|mut p| {
        p.push("tsql2bridge");
        p.push("history.txt");
        p
    });
    if let Some(ref path) = history_file {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.load_history(path); // Ignore error if file doesn't exist
    }

    println!("tsql2 {} - type \\? for help, \\q to quit.\n", env!("CARGO_PKG_VERSION"));

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() { "tsql2> " } else { "  ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if buffer.is_empty() && line.starts_with('\\') {
                    let _ = rl.add_history_entry(line);
                    match line {
                        "\\q" | "\\quit" => break,
                        "\\d" | "\\dt" => {
                            for name in adapter.catalog().table_names() {
                                if let Ok(table) = adapter.catalog().lookup(&name) {
                                    println!("  {} ({}) -> {}", table.name, table.kind, table.physical_name());
                                }
                            }
                        }
                        "\\?" | "\\h" | "\\help" => print_help(),
                        _ => println!("Unknown meta-command: {line}. Use \\? for help."),
                    }
                    continue;
                }
                if buffer.is_empty() && (line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit")) {
                    break;
                }
                if line.is_empty() {
                    continue;
                }

                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(line);
                if line.ends_with(';') {
                    let _ = rl.add_history_entry(buffer.as_str());
                    run_script(adapter, &buffer);
                    buffer.clear();
                }
            }
            Err(ReadlineError::Interrupted) => buffer.clear(),
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(ref path) = history_file {
        let _ = rl.save_history(path);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = AdapterConfig::load(args.config.as_deref())?;
    let connection = ConnectionHandle::new(MemoryConnection::new());
    let mut adapter = TemporalAdapter::open(connection, config)?;

    let ok = if let Some(sql) = &args.command {
        run_script(&mut adapter, sql)
    } else if let Some(path) = &args.file {
        let script = std::fs::read_to_string(path)?;
        run_script(&mut adapter, &script)
    } else {
        repl(&mut adapter)?;
        true
    };

    adapter.close()?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
