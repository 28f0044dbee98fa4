use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kubepatch_action::{ActionRegistry, TemplateAction, PATCH_ACTION_ID};
use kubepatch_apply::PatchExecutor;
use kubepatch_core::TracingLogger;
use kubepatch_kubehub::{ConfigProvider, InferConfig, KubeTransport, KubeconfigFile};
use serde_json::{json, Value as Json};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kubepatchctl", version, about = "Apply JSON or merge patches to Kubernetes resources")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Patch the resource described by a manifest (a `patch` array selects JSON patch, otherwise merge)
    Patch {
        /// YAML or JSON manifest; `-` reads stdin
        #[arg(short = 'f', long = "filename")]
        file: String,
        /// Kubeconfig file (default: KUBECONFIG / ~/.kube/config / in-cluster)
        #[arg(long = "kubeconfig")]
        kubeconfig: Option<PathBuf>,
        /// Kubeconfig context to use
        #[arg(long = "context")]
        context: Option<String>,
    },
    /// List registered actions
    Actions,
}

fn init_tracing() {
    let env = std::env::var("KUBEPATCH_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KUBEPATCH_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KUBEPATCH_METRICS_ADDR; expected host:port");
        }
    }
}

fn max_input_bytes() -> usize {
    std::env::var("KUBEPATCH_MAX_INPUT_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1 << 20) // 1 MiB default
}

/// Reads at most one byte past `max_bytes`, enough for the size check to trip.
fn read_limited(reader: impl Read, max_bytes: usize) -> Result<String> {
    let mut s = String::new();
    reader.take(max_bytes as u64 + 1).read_to_string(&mut s)?;
    Ok(s)
}

/// YAML is a superset of JSON, so one parser covers both.
fn parse_manifest(text: &str, max_bytes: usize) -> Result<Json> {
    if text.len() > max_bytes {
        return Err(anyhow!("manifest too large (>{} bytes)", max_bytes));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(text).context("parsing manifest")?;
    let json = serde_json::to_value(val).context("converting manifest to JSON")?;
    if !json.is_object() {
        return Err(anyhow!("manifest must be a mapping"));
    }
    Ok(json)
}

fn read_manifest(file: &str) -> Result<Json> {
    let max = max_input_bytes();
    let text = if file == "-" {
        read_limited(std::io::stdin().lock(), max).context("reading stdin")?
    } else {
        let f = std::fs::File::open(file).with_context(|| format!("opening {}", file))?;
        read_limited(f, max).with_context(|| format!("reading {}", file))?
    };
    parse_manifest(&text, max)
}

fn config_provider(kubeconfig: Option<PathBuf>, context: Option<String>) -> Arc<dyn ConfigProvider> {
    if kubeconfig.is_none() && context.is_none() {
        Arc::new(InferConfig)
    } else {
        Arc::new(KubeconfigFile { path: kubeconfig, context })
    }
}

fn human_summary(result: &Json) -> String {
    let kind = result.get("kind").and_then(Json::as_str).unwrap_or("object");
    let meta = result.get("metadata");
    let name = meta.and_then(|m| m.get("name")).and_then(Json::as_str).unwrap_or("-");
    let rv = meta.and_then(|m| m.get("resourceVersion")).and_then(Json::as_str);
    let target = match meta.and_then(|m| m.get("namespace")).and_then(Json::as_str) {
        Some(ns) => format!("{}/{}/{}", kind, ns, name),
        None => format!("{}/{}", kind, name),
    };
    match rv {
        Some(rv) => format!("patched {} (resourceVersion {})", target, rv),
        None => format!("patched {}", target),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Patch { file, kubeconfig, context } => {
            info!(file = %file, context = ?context, "patch invoked");
            let patch_data = read_manifest(&file)?;
            let executor = PatchExecutor::new(config_provider(kubeconfig, context), Arc::new(KubeTransport));
            let registry = ActionRegistry::with_patch_action(Arc::new(executor));
            let outputs = registry
                .run(PATCH_ACTION_ID, json!({ "patchData": patch_data }), Arc::new(TracingLogger))
                .await?;
            let result = outputs.get("result").cloned().unwrap_or(Json::Null);
            match cli.output {
                Output::Human => println!("{}", human_summary(&result)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
        }
        Commands::Actions => {
            let registry = ActionRegistry::with_patch_action(Arc::new(PatchExecutor::with_defaults()));
            match cli.output {
                Output::Human => {
                    for a in registry.actions() {
                        println!("{:<12} {}", a.id(), a.description());
                    }
                }
                Output::Json => {
                    let rows: Vec<Json> = registry
                        .actions()
                        .map(|a| json!({
                            "id": a.id(),
                            "description": a.description(),
                            "input": a.input_schema(),
                            "output": a.output_schema(),
                        }))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_and_json_manifests() {
        let y = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: ns1\nspec:\n  replicas: 3\n";
        let v = parse_manifest(y, 1_000_000).unwrap();
        assert_eq!(v["spec"]["replicas"], 3);

        let j = r#"{"apiVersion":"v1","kind":"Pod","metadata":{"name":"p1","namespace":"ns2"},"patch":[{"op":"remove","path":"/metadata/labels/env"}]}"#;
        let v = parse_manifest(j, 1_000_000).unwrap();
        assert!(v["patch"].is_array());
    }

    #[test]
    fn manifest_errors_are_friendly() {
        let e = parse_manifest("kind: Pod\n", 4).unwrap_err().to_string();
        assert!(e.contains("too large"), "e={}", e);

        let e = parse_manifest("- a\n- b\n", 1_000_000).unwrap_err().to_string();
        assert!(e.contains("mapping"), "e={}", e);

        let e = parse_manifest("a: [", 1_000_000).unwrap_err().to_string();
        assert!(e.contains("parsing manifest"), "e={}", e);
    }

    #[test]
    fn oversized_input_is_cut_off_and_rejected() {
        let big = format!("kind: Pod\nspec: \"{}\"\n", "x".repeat(64));
        let text = read_limited(big.as_bytes(), 16).unwrap();
        assert_eq!(text.len(), 17);
        let e = parse_manifest(&text, 16).unwrap_err().to_string();
        assert!(e.contains("too large"), "e={}", e);

        let small = "kind: Pod\n";
        assert_eq!(read_limited(small.as_bytes(), 16).unwrap(), small);
    }

    #[test]
    fn human_summary_mentions_target_and_rv() {
        let r = json!({ "kind": "Deployment", "metadata": { "name": "web", "namespace": "ns1", "resourceVersion": "42" } });
        assert_eq!(human_summary(&r), "patched Deployment/ns1/web (resourceVersion 42)");
        assert_eq!(human_summary(&Json::Null), "patched object/-");
    }
}
