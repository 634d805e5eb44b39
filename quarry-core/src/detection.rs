//! Model-service availability detection and setup guidance.

use crate::config::Config;
use crate::provider::{ModelInfo, Provider, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Model service is not reachable: {0}")]
    Unavailable(String),

    #[error("Model '{0}' is not available on the model service")]
    ModelNotFound(String),
}

pub type Result<T> = std::result::Result<T, DetectionError>;

/// What the model service reported at startup.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub models: Vec<ModelInfo>,
}

/// Checks the service is up and serves the configured models, printing
/// guidance if not.
///
/// # Example
///
/// ```no_run
/// use quarry_core::{detection, Config, provider::OllamaProvider};
///
/// # async fn example() {
/// let config = Config::default();
/// let provider = OllamaProvider::new(&config);
/// match detection::detect_service(&provider, &config).await {
///     Ok(_) => println!("Ready to go!"),
///     Err(e) => eprintln!("Setup required: {}", e),
/// }
/// # }
/// ```
pub async fn detect_service(provider: &dyn Provider, config: &Config) -> Result<ServiceInfo> {
    match check_service_silent(provider, config).await {
        Ok(info) => Ok(info),
        Err(DetectionError::Unavailable(reason)) => {
            print_startup_help(&config.llm.base_url);
            Err(DetectionError::Unavailable(reason))
        }
        Err(DetectionError::ModelNotFound(model)) => {
            print_pull_help(&model);
            Err(DetectionError::ModelNotFound(model))
        }
    }
}

/// Quietly checks the service without printing help messages.
pub async fn check_service_silent(provider: &dyn Provider, config: &Config) -> Result<ServiceInfo> {
    let models = match provider.list_models().await {
        Ok(models) => models,
        Err(ProviderError::ModelNotFound(model)) => return Err(DetectionError::ModelNotFound(model)),
        Err(e) => return Err(DetectionError::Unavailable(e.to_string())),
    };

    for wanted in [&config.rag.embedding_model, &config.llm.model] {
        if !models.iter().any(|m| m.matches(wanted)) {
            return Err(DetectionError::ModelNotFound(wanted.clone()));
        }
    }

    Ok(ServiceInfo { models })
}

fn print_startup_help(base_url: &str) {
    eprintln!("❌ Could not reach the model service at {}", base_url);
    eprintln!();
    eprintln!("  Start Ollama:");

    #[cfg(target_os = "macos")]
    {
        eprintln!("   • Run the Ollama app from Applications");
        eprintln!("   • Or:  ollama serve  (in a separate terminal)");
    }

    #[cfg(not(target_os = "macos"))]
    {
        eprintln!("   ollama serve");
    }

    eprintln!();
    eprintln!("  Verify it's running:");
    eprintln!("   ollama list");
}

fn print_pull_help(model: &str) {
    eprintln!("❌ Model '{}' is not available!", model);
    eprintln!();
    eprintln!("  Pull it with:");
    eprintln!("   ollama pull {}", model);
}
