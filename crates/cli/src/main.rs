use std::io::Read;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tether_engine::{EngineSettings, ProviderSession, RuntimePlaceholders, RuntimeValues, parse_description_with};
use tether_types::{ProviderDefinition, ResolvedRequest};
use tether_util::{
    JsonProviderStore, JsonSelectionStore, KeychainSelectionStore, KeyringVault, SecretsBackend, SelectionStore, TetherConfig,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Pick an LLM provider, fill in its variables, and compose requests.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the provider list
    #[command(subcommand)]
    Providers(ProvidersCommand),
    /// Parse a curl command and print the resulting template
    Parse {
        /// The curl command; read from stdin when omitted
        curl: Option<String>,
    },
    /// Select a provider; clears all entered values
    Select { id: String },
    /// Set a variable of the selected provider
    Set { key: String, value: String },
    /// Clear a variable of the selected provider
    Clear { key: String },
    /// Manage the credential of the selected provider
    #[command(subcommand)]
    Credential(CredentialCommand),
    /// Show the selected provider and its fields
    Status,
    /// Compose the request for the selected provider
    Compose {
        /// Value for the {{TEXT}} placeholder
        #[arg(long)]
        text: Option<String>,
        /// Value for the {{IMAGE}} placeholder
        #[arg(long)]
        image: Option<String>,
        /// Value for the {{SYSTEM_PROMPT}} placeholder
        #[arg(long)]
        system_prompt: Option<String>,
        /// Value for any configured runtime placeholder, as KEY=VALUE
        #[arg(long = "runtime", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        runtime: Vec<(String, String)>,
        /// Print secrets instead of masking them
        #[arg(long)]
        reveal: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ProvidersCommand {
    /// List built-in and custom providers
    List,
    /// Print a provider's curl command and template
    Show { id: String },
    /// Add or replace a custom provider
    Add {
        id: String,
        /// The curl command; read from stdin when omitted
        curl: Option<String>,
    },
    /// Remove a custom provider
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum CredentialCommand {
    /// Store the credential; read from stdin when omitted
    Submit { value: Option<String> },
    /// Remove the stored credential
    Remove,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = TetherConfig::load().context("failed to load configuration")?;
    let settings = EngineSettings::from_config(&config);

    if let Command::Parse { curl } = cli.command {
        let curl = read_arg_or_stdin(curl)?;
        let template = parse_description_with(&curl, &settings.runtime).context("failed to parse curl command")?;
        return print_json(&template);
    }

    let mut session = open_session(&config, settings)?;
    run_command(&mut session, cli.command)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn open_session(config: &TetherConfig, settings: EngineSettings) -> Result<ProviderSession> {
    let providers_path = config.providers_path();
    let selection_path = config.selection_path();
    debug!(providers = %providers_path.display(), selection = %selection_path.display(), "Opening stores");

    let providers = JsonProviderStore::new(&providers_path)
        .with_context(|| format!("failed to open provider store at {}", providers_path.display()))?;
    let selection = JsonSelectionStore::new(&selection_path)
        .with_context(|| format!("failed to open selection store at {}", selection_path.display()))?;
    let selection: Box<dyn SelectionStore> = match config.secrets_backend() {
        SecretsBackend::File => Box::new(selection),
        SecretsBackend::Keychain => {
            let sensitive_keys = settings.sensitive_keys.keys().to_vec();
            Box::new(KeychainSelectionStore::new(selection, Box::new(KeyringVault), sensitive_keys))
        }
    };
    Ok(ProviderSession::open(settings, Box::new(providers), selection)?)
}

fn run_command(session: &mut ProviderSession, command: Command) -> Result<()> {
    match command {
        Command::Providers(command) => run_providers(session, command),
        Command::Select { id } => {
            session.select_provider(&id)?;
            print_status(session)
        }
        Command::Set { key, value } => {
            session.set_override(&key, &value)?;
            Ok(())
        }
        Command::Clear { key } => {
            session.clear_override(&key)?;
            Ok(())
        }
        Command::Credential(CredentialCommand::Submit { value }) => {
            let value = read_arg_or_stdin(value)?;
            session.submit_credential(value.trim())?;
            Ok(())
        }
        Command::Credential(CredentialCommand::Remove) => {
            session.remove_credential()?;
            Ok(())
        }
        Command::Status => print_status(session),
        Command::Compose {
            text,
            image,
            system_prompt,
            runtime,
            reveal,
        } => {
            let named = [("text", text), ("image", image), ("system_prompt", system_prompt)]
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)));
            let values = runtime_values(&session.settings().runtime, named.chain(runtime))?;
            let request = session.compose(&values)?;
            let request = if reveal { request } else { mask_request(session, request) };
            print_json(&request)
        }
        Command::Parse { .. } => bail!("parse does not use a provider session"),
    }
}

fn run_providers(session: &mut ProviderSession, command: ProvidersCommand) -> Result<()> {
    match command {
        ProvidersCommand::List => {
            let selected = session.selection().map(|selection| selection.provider_id.clone());
            for provider in session.providers() {
                let marker = if selected.as_deref() == Some(provider.id.as_str()) { "*" } else { " " };
                let kind = if provider.is_custom { "custom" } else { "builtin" };
                println!("{marker} {:<12} {:<8} {}", provider.id, kind, session.display_name(provider));
            }
            Ok(())
        }
        ProvidersCommand::Show { id } => {
            let provider = session.registry().get(&id)?;
            let template = parse_description_with(&provider.description, &session.settings().runtime).ok();
            print_json(&json!({
                "id": provider.id,
                "isCustom": provider.is_custom,
                "curl": provider.description,
                "template": template,
            }))
        }
        ProvidersCommand::Add { id, curl } => {
            let curl = read_arg_or_stdin(curl)?;
            parse_description_with(&curl, &session.settings().runtime)
                .with_context(|| format!("custom provider '{id}' is not a valid curl command"))?;
            session.upsert_custom_provider(ProviderDefinition::custom(id, curl))?;
            Ok(())
        }
        ProvidersCommand::Remove { id } => {
            session.remove_custom_provider(&id)?;
            Ok(())
        }
    }
}

fn print_status(session: &ProviderSession) -> Result<()> {
    let Some(selection) = session.selection() else {
        println!("No provider selected");
        return Ok(());
    };
    let fields: Vec<_> = session
        .fields()
        .into_iter()
        .map(|field| {
            json!({
                "key": field.key,
                "title": field.title,
                "value": field.display_value,
                "set": field.is_set,
                "credential": field.is_credential,
            })
        })
        .collect();
    print_json(&json!({
        "provider": selection.provider_id,
        "parsed": session.template().is_some(),
        "fields": fields,
    }))
}

/// Masks every entered sensitive value plus anything that looks like a secret.
fn mask_request(session: &ProviderSession, request: ResolvedRequest) -> ResolvedRequest {
    ResolvedRequest {
        method: request.method,
        url: session.mask_secrets(&request.url),
        headers: request
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), session.mask_secrets(value)))
            .collect(),
        body: request.body.as_deref().map(|body| session.mask_secrets(body)),
    }
}

/// Collects runtime values, rejecting keys the configuration does not define.
fn runtime_values(
    placeholders: &RuntimePlaceholders,
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Result<RuntimeValues> {
    let mut values = RuntimeValues::new();
    for (key, value) in pairs {
        let key = key.trim().to_lowercase();
        if !placeholders.contains(&key) {
            bail!(
                "'{key}' is not a runtime placeholder (configured: {})",
                placeholders.keys().join(", ")
            );
        }
        values.insert(key, value);
    }
    Ok(values)
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn read_arg_or_stdin(value: Option<String>) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer).context("failed to read from stdin")?;
    if buffer.trim().is_empty() {
        bail!("no input given");
    }
    Ok(buffer)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
