use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::{Command, Stdio};

const MASP_PARAM_FILES: [&str; 3] = [
    "masp-spend.params",
    "masp-output.params",
    "masp-convert.params",
];

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Wallet extension task runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tests
    Test {
        #[command(subcommand)]
        test_type: Option<TestType>,
    },

    /// Run clippy linter
    Clippy,

    /// Generate a development config with an emulated ledger
    GenConfig {
        /// Where to write the config
        #[arg(short, long, default_value = "extension.toml")]
        output: String,

        /// Use the RocksDB store instead of the in-memory one
        #[arg(long)]
        rocksdb: bool,
    },

    /// Run the background binary with a config
    Run {
        /// Config file (default: extension.toml)
        #[arg(short, long, default_value = "extension.toml")]
        config: String,
    },
}

#[derive(Subcommand)]
enum TestType {
    /// Router crate only
    Router,

    /// Extension crate only
    Extension,

    /// Run all Rust tests
    Unit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test { test_type } => test(test_type),
        Commands::Clippy => clippy(),
        Commands::GenConfig { output, rocksdb } => gen_config(&output, rocksdb),
        Commands::Run { config } => run(&config),
    }
}

fn test(test_type: Option<TestType>) -> Result<()> {
    match test_type {
        Some(TestType::Router) => {
            println!("🧪 Testing extension-router...");
            run_cmd("cargo", &["test", "-p", "extension-router"])?;
        }
        Some(TestType::Extension) => {
            println!("🧪 Testing wallet-extension...");
            run_cmd("cargo", &["test", "-p", "wallet-extension"])?;
        }
        Some(TestType::Unit) | None => {
            println!("🧪 Running all tests...");
            run_cmd("cargo", &["test", "--workspace"])?;
        }
    }
    Ok(())
}

fn clippy() -> Result<()> {
    println!("🔍 Running clippy on workspace (warnings as errors)...");
    run_cmd(
        "cargo",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ],
    )?;
    Ok(())
}

fn gen_config(output: &str, rocksdb: bool) -> Result<()> {
    use std::fs;

    println!("🔧 Generating development config at {}", output);

    let params_dir = "dev-data/masp-params";
    fs::create_dir_all(params_dir).context("Failed to create masp params directory")?;
    // Placeholder params; the worker only fingerprints them.
    for name in MASP_PARAM_FILES {
        let path = format!("{}/{}", params_dir, name);
        fs::write(&path, generate_random_hex(64))
            .with_context(|| format!("Failed to write {}", path))?;
    }

    let backend = if rocksdb { "rocksdb" } else { "memory" };
    let config_content = format!(
        r#"[chain]
chain_id = "namada-dev"
rpc_url = "http://127.0.0.1:26657"

[storage]
backend = "{}"
path = "dev-data/store"

[worker]
masp_params_dir = "{}"

[ledger]
emulated_seed_hex = "{}"
auto_approve = true
"#,
        backend,
        params_dir,
        generate_random_hex(32)
    );
    fs::write(output, config_content).context("Failed to write config")?;

    println!("✅ Config written");
    println!("   Run with: cargo xtask run --config {}", output);
    Ok(())
}

fn run(config: &str) -> Result<()> {
    println!("🚀 Starting background context with {}", config);
    let status = Command::new("cargo")
        .args(["run", "-p", "wallet-extension", "--bin", "background"])
        .env("CONFIG_PATH", config)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to run background binary")?;

    if !status.success() {
        anyhow::bail!("Background binary exited with {}", status);
    }
    Ok(())
}

fn run_cmd(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to run: {} {}", program, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("Command failed: {} {}", program, args.join(" "));
    }

    Ok(())
}

fn generate_random_hex(bytes: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    hex::encode(&random_bytes)
}

mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut result = String::with_capacity(bytes.len() * 2);
        for &byte in bytes {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        result
    }
}
