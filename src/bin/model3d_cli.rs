//! Model3D CLI：3D 生成请求、签名调试与配置查看的命令行工具
//!
//! Usage:
//!   model3d-cli generate --text <prompt> | --image <path-or-url>   Run one generation task
//!   model3d-cli poll <job-id>                                      Query a provider job
//!   model3d-cli sign --action <action> [--body <json>]             Print signed headers
//!   model3d-cli config                                             Show effective configuration

use anyhow::{anyhow, bail, Context};
use base64::Engine;
use model3d_forge::cache::ResultCache;
use model3d_forge::config::GeneratorConfig;
use model3d_forge::lifecycle::TaskLifecycle;
use model3d_forge::provider::{
    HunyuanProvider, JobStatus, ProviderGateway, ProviderSigner, SigningInput, SigningProfile,
};
use model3d_forge::store::{InMemoryTaskStore, TaskStore};
use model3d_forge::telemetry::{init_tracing, DEFAULT_DIRECTIVE};
use model3d_forge::types::{GenerationRequest, QualityParams, TaskStatus};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }
    init_tracing(DEFAULT_DIRECTIVE);

    let outcome = match args[1].as_str() {
        "generate" => cmd_generate(&args[2..]).await,
        "poll" => cmd_poll(&args[2..]).await,
        "sign" => cmd_sign(&args[2..]),
        "config" => cmd_config(&args[2..]),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"model3d-cli: 3D 生成命令行工具

USAGE:
    model3d-cli <COMMAND> [OPTIONS]

COMMANDS:
    generate --text <prompt>         Generate a model from a text prompt
    generate --image <path|url>      Generate a model from an image
        [--user <id>] [--format <OBJ|GLB|STL|USDZ|FBX|MP4>] [--pbr]
    poll <job-id>                    Query the status of a provider job
    sign --action <action>           Print signed request headers
        [--body <json>] [--timestamp <unix-secs>]
    config                           Show the effective configuration (secrets redacted)
    version                          Show version information
    help                             Show this help message

GLOBAL OPTIONS:
    --config <path>                  YAML configuration file

ENVIRONMENT:
    MODEL3D_SECRET_ID / MODEL3D_SECRET_KEY   Provider credentials
    MODEL3D_PROVIDER_REGION                  Provider region (default ap-beijing)
    RUST_LOG                                 Log filter"#
    );
}

fn cmd_version() {
    println!("model3d-cli {}", env!("CARGO_PKG_VERSION"));
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn load_config(args: &[String]) -> anyhow::Result<GeneratorConfig> {
    let config = match flag_value(args, "--config") {
        Some(path) => GeneratorConfig::load(path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => GeneratorConfig::default().with_env_overrides(),
    };
    config.validate()?;
    Ok(config)
}

fn build_gateway(config: &GeneratorConfig) -> anyhow::Result<ProviderGateway> {
    let provider = HunyuanProvider::new(config.credentials()?, config.hunyuan_settings())?;
    Ok(ProviderGateway::new(
        Arc::new(provider),
        config.gateway_settings(),
    ))
}

fn image_input(value: &str) -> anyhow::Result<String> {
    if value.starts_with("http://") || value.starts_with("https://") || value.starts_with("data:") {
        return Ok(value.to_string());
    }
    let bytes = std::fs::read(value).with_context(|| format!("reading image {value}"))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

async fn cmd_generate(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let user = flag_value(args, "--user").unwrap_or("cli");
    let request = match (flag_value(args, "--text"), flag_value(args, "--image")) {
        (Some(prompt), None) => GenerationRequest::text(user, prompt),
        (None, Some(image)) => GenerationRequest::image(user, image_input(image)?),
        _ => bail!("exactly one of --text or --image is required"),
    };
    let mut params = QualityParams::new();
    if let Some(format) = flag_value(args, "--format") {
        params = params.with_result_format(format.to_uppercase());
    }
    if has_flag(args, "--pbr") {
        params = params.with_pbr(true);
    }
    let request = request.with_params(params);

    let store = Arc::new(InMemoryTaskStore::new());
    store.open().await?;
    // No scorer is wired: scores come from a deployment-specific assessor.
    let lifecycle = TaskLifecycle::new(
        Arc::new(ResultCache::in_memory(config.cache_settings())),
        Arc::new(build_gateway(&config)?),
        store.clone(),
    );

    let task = lifecycle.submit(request).await?;
    let task = lifecycle
        .task(&task.task_id)
        .await?
        .ok_or_else(|| anyhow!("task {} disappeared from the store", task.task_id))?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    store.close().await?;
    if task.status == TaskStatus::Failed {
        std::process::exit(2);
    }
    Ok(())
}

async fn cmd_poll(args: &[String]) -> anyhow::Result<()> {
    let job_id = args
        .first()
        .filter(|a| !a.starts_with("--"))
        .ok_or_else(|| anyhow!("poll requires a job id"))?;
    let config = load_config(args)?;
    let gateway = build_gateway(&config)?;
    match gateway.poll(job_id, None).await? {
        JobStatus::Done(result) => {
            println!("{}: DONE", job_id);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        JobStatus::Failed { code, message } => {
            println!(
                "{}: FAIL [{}] {}",
                job_id,
                code.as_deref().unwrap_or("-"),
                message
            );
        }
        status => println!("{}: {}", job_id, status.as_str()),
    }
    Ok(())
}

fn cmd_sign(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let action = flag_value(args, "--action").ok_or_else(|| anyhow!("sign requires --action"))?;
    let body = flag_value(args, "--body").unwrap_or("{}");
    let timestamp = match flag_value(args, "--timestamp") {
        Some(ts) => ts.parse::<i64>().context("--timestamp must be unix seconds")?,
        None => chrono::Utc::now().timestamp(),
    };
    let signer = ProviderSigner::new(SigningProfile::hunyuan(), config.credentials()?);
    let signed = signer.sign(&SigningInput {
        host: &config.provider.endpoint,
        action,
        region: Some(&config.provider.region),
        body,
        timestamp,
    })?;
    for (name, value) in &signed.headers {
        println!("{name}: {value}");
    }
    Ok(())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    print!("{}", config.redacted().to_yaml()?);
    Ok(())
}
