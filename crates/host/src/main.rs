use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::EnvFilter;
use vbridge_abi::ReservedVariant;
use vbridge_host::linker::link_bridge;
use vbridge_host::BridgeState;
use wasmtime::{Engine, Instance, Linker, Module, Store};

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum LogFormat {
    /// Human-friendly text logs suitable for local development.
    Text,
    /// JSON logs for ingestion into systems such as Loki or OTLP collectors.
    Json,
}

#[derive(Parser, Debug)]
#[command(version, about = "WebAssembly value-bridge host")]
struct HostOptions {
    /// Log output format (text or JSON) for tracing events.
    #[arg(long, env = "VBRIDGE_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
    /// Path to the guest wasm module to instantiate and run.
    module: PathBuf,
    /// Seed the minimal reserved-handle prefix (`0..4`) instead of the
    /// default extended prefix (`0..6`, with `console` and the sentinel).
    #[arg(long)]
    minimal_reserved: bool,
    /// Name of the guest export to invoke once linking completes.
    #[arg(long, default_value = "run")]
    entrypoint: String,
}

fn initialise_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))?;

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_timer(SystemTime).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().json().with_env_filter(filter).with_target(false).with_current_span(true).with_span_list(true).init();
        }
    }

    Ok(())
}

fn run(options: &HostOptions) -> Result<()> {
    let variant = if options.minimal_reserved { ReservedVariant::Minimal } else { ReservedVariant::Extended };

    let engine = Engine::default();
    let module = Module::from_file(&engine, &options.module).with_context(|| format!("load guest module {}", options.module.display()))?;

    let mut linker = Linker::<BridgeState>::new(&engine);
    link_bridge(&mut linker).context("link value-bridge ABI")?;

    let mut store = Store::new(&engine, BridgeState::new(variant));
    let instance = linker.instantiate(&mut store, &module).context("instantiate guest module")?;

    info!(entrypoint = %options.entrypoint, "handle table seeded; invoking guest entry point");
    invoke_entrypoint(&mut store, &instance, &options.entrypoint)?;

    Ok(())
}

fn invoke_entrypoint(store: &mut Store<BridgeState>, instance: &Instance, name: &str) -> Result<()> {
    let func = instance
        .get_typed_func::<(), ()>(&mut *store, name)
        .with_context(|| format!("guest module has no zero-argument export named `{name}`"))?;
    func.call(store, ()).with_context(|| format!("guest export `{name}` trapped"))
}

fn main() -> Result<()> {
    let options = HostOptions::parse();
    initialise_tracing(options.log_format)?;
    run(&options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_default_options() {
        let opts = HostOptions::parse_from(["vbridge", "guest.wasm"]);
        assert_eq!(opts.log_format, LogFormat::Text);
        assert!(!opts.minimal_reserved);
        assert_eq!(opts.entrypoint, "run");
        assert_eq!(opts.module, PathBuf::from("guest.wasm"));
    }

    #[test]
    fn parses_minimal_reserved_flag() {
        let opts = HostOptions::parse_from(["vbridge", "--minimal-reserved", "guest.wasm"]);
        assert!(opts.minimal_reserved);
    }
}
