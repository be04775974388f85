//! Hash de senhas
//!
//! Usuários e pacientes autenticam com senha. O núcleo só conhece o trait
//! [`Hasher`]; a implementação padrão usa Argon2id com sal aleatório e grava o
//! resultado no formato PHC (`$argon2id$v=19$...`).

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::error::{CoreError, DbError};

/// Erros específicos para operações de hash
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Falha ao gerar hash da senha: {0}")]
    HashFailed(String),

    #[error("Configuração de hash inválida: {0}")]
    InvalidConfiguration(String),
}

impl From<CryptoError> for CoreError {
    fn from(error: CryptoError) -> Self {
        tracing::error!(error = %error, "Falha no hash de senha");
        CoreError::Persistence(DbError::InternalError(error.to_string()))
    }
}

pub trait Hasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, CryptoError>;

    /// Falso também quando `digest` não é um hash PHC válido
    fn verify(&self, secret: &str, digest: &str) -> bool;
}

/// Hasher Argon2id
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Cria um hasher com custo de memória (KiB), iterações e paralelismo próprios
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, CryptoError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Hasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CryptoError::HashFailed(e.to_string()))
    }

    fn verify(&self, secret: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self
                .argon2
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
