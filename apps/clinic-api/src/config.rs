//! Configuração da API lida de variáveis de ambiente
//!
//! Variáveis obrigatórias ausentes ou inválidas interrompem a inicialização com
//! uma mensagem clara.

use std::env;
use std::net::SocketAddr;
use thiserror::Error;
use zeroize::Zeroizing;

const DEFAULT_DATABASE_PATH: &str = "data/clinic.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONCURRENCY_LIMIT: usize = 256;
const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Variável de ambiente obrigatória ausente: {0}")]
    Missing(&'static str),

    #[error("Valor inválido para {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Formato dos logs no stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Administrador criado na inicialização, se ainda não existir
#[derive(Clone)]
pub struct AdminBootstrap {
    pub name: String,
    pub email: String,
    pub password: Zeroizing<String>,
}

#[derive(Clone)]
pub struct ApiConfig {
    pub database_path: String,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub jwt_secret: Zeroizing<String>,
    /// Validade do token de acesso, em segundos
    pub token_ttl_secs: i64,
    pub log_format: LogFormat,
    pub concurrency_limit: usize,
    pub admin: Option<AdminBootstrap>,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("database_path", &self.database_path)
            .field("db_max_connections", &self.db_max_connections)
            .field("bind_addr", &self.bind_addr)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("log_format", &self.log_format)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("admin", &self.admin.as_ref().map(|a| a.email.as_str()))
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Monta a configuração a partir de uma função de consulta, para testes
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET_KEY").ok_or(ConfigError::Missing("JWT_SECRET_KEY"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET_KEY",
                reason: format!("precisa ter ao menos {} caracteres", MIN_SECRET_LEN),
            });
        }

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), DEFAULT_MAX_CONNECTIONS)?;
        let token_ttl_secs = parse_or(
            "JWT_ACCESS_TOKEN_EXPIRES",
            get("JWT_ACCESS_TOKEN_EXPIRES"),
            DEFAULT_TOKEN_TTL_SECS,
        )?;
        if token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_ACCESS_TOKEN_EXPIRES",
                reason: "precisa ser positivo".to_string(),
            });
        }
        let concurrency_limit = parse_or("CONCURRENCY_LIMIT", get("CONCURRENCY_LIMIT"), DEFAULT_CONCURRENCY_LIMIT)?;

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("esperado 'json' ou 'pretty', recebido '{}'", other),
                })
            }
        };

        let admin = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap {
                name: get("ADMIN_NAME").unwrap_or_else(|| "Administrador".to_string()),
                email,
                password: Zeroizing::new(password),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        Ok(Self {
            database_path: get("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            db_max_connections,
            bind_addr,
            jwt_secret: Zeroizing::new(jwt_secret),
            token_ttl_secs,
            log_format,
            concurrency_limit,
            admin,
        })
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
