use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldops_core::api::{FormField, UploadFile};
use fieldops_core::config::CredentialBackend;
use fieldops_core::{
    ApiClient, ApiError, Config, Credentials, Notifier, RequestDescriptor, ResponseBody, SessionEvent,
};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "fieldops", version, about = "Command line client for the FieldOps dashboard API")]
pub struct Cli {
    /// API base URL (overrides the config file)
    #[arg(long, global = true, env = "FIELDOPS_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long, env = "FIELDOPS_EMAIL")]
        email: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    Get {
        path: String,
    },
    Delete {
        path: String,
    },
    Post {
        path: String,
        /// JSON request body
        body: String,
    },
    Put {
        path: String,
        body: String,
    },
    Patch {
        path: String,
        body: String,
    },
    /// Upload a file as multipart/form-data
    Upload {
        path: String,
        file: PathBuf,
        /// Extra form field, repeatable: --field siteId=4
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, FormField)>,
        #[arg(long)]
        mime: Option<String>,
    },
    /// Download a response body to a file
    Download {
        path: String,
        destination: PathBuf,
    },
    /// Show the stored configuration, or change it
    Config {
        /// Store a new API base URL
        #[arg(long)]
        set_url: Option<String>,
        /// Store the credential backend: file, keyring or memory
        #[arg(long)]
        backend: Option<CredentialBackend>,
    },
}

/// Prints reported request failures to stderr.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, message: &str) {
        eprintln!("Error: {}", message);
    }
}

/// Whether `err` already went through the notifier.
pub fn was_reported(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ApiError>()
        .is_some_and(ApiError::is_reportable)
}

/// Print a sign-in hint if the session ended while running.
pub fn print_session_hints(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        if event.requires_login() {
            eprintln!("Your session has ended. Run `fieldops login` to sign in again.");
            return;
        }
    }
}

fn parse_field(raw: &str) -> Result<(String, FormField), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    if key.is_empty() {
        return Err(format!("empty field name in `{}`", raw));
    }
    // Only values that print back unchanged are numbers, so "0042" stays text
    let field = match value.parse::<f64>() {
        Ok(n) if n.is_finite() && n.to_string() == value => FormField::Number(n),
        _ => FormField::Text(value.to_string()),
    };
    Ok((key.to_string(), field))
}

/// Apply the requested changes to the config stored at `path` and save it.
///
/// Environment overrides are not applied, so they never get written back.
pub fn configure(
    path: &Path,
    set_url: Option<String>,
    backend: Option<CredentialBackend>,
) -> Result<Config> {
    let mut config = Config::load_from(path)?;
    if set_url.is_none() && backend.is_none() {
        return Ok(config);
    }

    if let Some(url) = set_url {
        let url = url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            anyhow::bail!("API URL cannot be empty");
        }
        config.api_base_url = url;
    }
    if let Some(backend) = backend {
        config.credential_backend = backend;
    }
    config.save_to(path)?;
    tracing::info!(path = %path.display(), "Configuration saved");
    Ok(config)
}

pub fn print_config(config: &Config) {
    println!("api_base_url        {}", config.api_base_url);
    println!("login_path          {}", config.login_path);
    println!("refresh_path        {}", config.refresh_path);
    println!("request_timeout     {}s", config.request_timeout_secs);
    println!("credential_backend  {}", config.credential_backend);
}

fn parse_body(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).context("Request body must be valid JSON")
}

fn print_body(body: ResponseBody) -> Result<()> {
    match body {
        ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ResponseBody::Text(text) => println!("{}", text),
        ResponseBody::Binary(bytes) => io::stdout().write_all(&bytes)?,
        ResponseBody::Empty => {}
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub async fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => prompt("Email: ")?,
            };
            let password = rpassword::prompt_password("Password: ")?;
            let session = client.login(&Credentials::new(email, password)).await?;
            println!("Signed in as {}", session.user.summary());
        }
        Command::Logout => {
            client.logout();
            println!("Signed out");
        }
        Command::Whoami => {
            let user = client
                .session()
                .current_user()
                .ok_or(ApiError::Unauthenticated)?;
            println!("{}", user.summary());
            println!("{}", user.email);
        }
        Command::Get { path } => print_body(client.execute(RequestDescriptor::get(path)).await?)?,
        Command::Delete { path } => {
            print_body(client.execute(RequestDescriptor::delete(path)).await?)?
        }
        Command::Post { path, body } => {
            let request = RequestDescriptor::post(path).json(&parse_body(&body)?)?;
            print_body(client.execute(request).await?)?
        }
        Command::Put { path, body } => {
            let request = RequestDescriptor::put(path).json(&parse_body(&body)?)?;
            print_body(client.execute(request).await?)?
        }
        Command::Patch { path, body } => {
            let request = RequestDescriptor::patch(path).json(&parse_body(&body)?)?;
            print_body(client.execute(request).await?)?
        }
        Command::Upload {
            path,
            file,
            fields,
            mime,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let mut upload = UploadFile::new(file_name, bytes);
            if let Some(mime) = mime {
                upload = upload.mime_type(mime);
            }
            let fields: BTreeMap<String, FormField> = fields.into_iter().collect();
            let created: serde_json::Value = client.upload(&path, upload, fields).await?;
            print_body(ResponseBody::Json(created))?;
        }
        Command::Download { path, destination } => {
            let saved = client.download(&path, &destination).await?;
            println!("Saved {}", saved.display());
        }
        Command::Config { set_url, backend } => {
            print_config(&configure(&Config::config_path()?, set_url, backend)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("siteId=4").unwrap(),
            ("siteId".to_string(), FormField::Number(4.0))
        );
        assert_eq!(
            parse_field("caption=North gate").unwrap(),
            ("caption".to_string(), FormField::Text("North gate".to_string()))
        );
        assert_eq!(
            parse_field("note=a=b").unwrap(),
            ("note".to_string(), FormField::Text("a=b".to_string()))
        );
        assert_eq!(
            parse_field("ratio=2.5").unwrap(),
            ("ratio".to_string(), FormField::Number(2.5))
        );
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=4").is_err());
    }

    #[test]
    fn test_parse_field_keeps_non_canonical_numbers_as_text() {
        for raw in ["0042", "1e3", "4.0", "+7", " 5"] {
            let (_, field) = parse_field(&format!("code={}", raw)).unwrap();
            assert_eq!(field, FormField::Text(raw.to_string()), "{}", raw);
        }
    }

    #[test]
    fn test_cli_parses_config() {
        let cli = Cli::try_parse_from([
            "fieldops",
            "config",
            "--set-url",
            "https://ops.example.org",
            "--backend",
            "keyring",
        ])
        .unwrap();

        match cli.command {
            Command::Config { set_url, backend } => {
                assert_eq!(set_url.as_deref(), Some("https://ops.example.org"));
                assert_eq!(backend, Some(CredentialBackend::Keyring));
            }
            _ => panic!("expected config"),
        }
        assert!(Cli::try_parse_from(["fieldops", "config", "--backend", "vault"]).is_err());
    }

    #[test]
    fn test_configure_saves_changes() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let dir = std::env::temp_dir().join(format!("fieldops-cli-{}-{}", std::process::id(), nanos));
        let path = dir.join("config.json");

        // Nothing to change: nothing written
        configure(&path, None, None).unwrap();
        assert!(!path.exists());

        let saved = configure(
            &path,
            Some("https://ops.example.org/".to_string()),
            Some(CredentialBackend::Memory),
        )
        .unwrap();
        assert_eq!(saved.api_base_url, "https://ops.example.org");

        let updated = configure(&path, None, Some(CredentialBackend::File)).unwrap();
        assert_eq!(updated.api_base_url, "https://ops.example.org");
        assert_eq!(updated.credential_backend, CredentialBackend::File);
        assert_eq!(Config::load_from(&path).unwrap().credential_backend, CredentialBackend::File);

        assert!(configure(&path, Some("  ".to_string()), None).is_err());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_cli_parses_upload() {
        let cli = Cli::try_parse_from([
            "fieldops",
            "upload",
            "/api/sites/4/photos",
            "gate.jpg",
            "--field",
            "caption=North gate",
            "--field",
            "visitId=12",
        ])
        .unwrap();

        match cli.command {
            Command::Upload { fields, file, .. } => {
                assert_eq!(file, PathBuf::from("gate.jpg"));
                assert_eq!(fields.len(), 2);
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn test_was_reported() {
        let reported: anyhow::Error = ApiError::Network("down".to_string()).into();
        let signalled: anyhow::Error = ApiError::SessionExpired.into();
        assert!(was_reported(&reported));
        assert!(!was_reported(&signalled));
    }
}
