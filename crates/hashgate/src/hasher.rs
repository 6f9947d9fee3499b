//! Argon2 password hashing as a protected task.

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::task::{ProtectedTask, TaskFailure};

/// Text to hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashInput {
    pub content: String,
}

impl HashInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Hash in PHC string format (`$argon2i$v=19$m=...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashOutput {
    pub hash: String,
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes over memory.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl HashParams {
    pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
    pub const DEFAULT_ITERATIONS: u32 = 8;
    pub const DEFAULT_PARALLELISM: u32 = 1;

    pub fn memory_bytes(&self) -> u64 {
        u64::from(self.memory_kib) * 1024
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: Self::DEFAULT_MEMORY_KIB,
            iterations: Self::DEFAULT_ITERATIONS,
            parallelism: Self::DEFAULT_PARALLELISM,
        }
    }
}

/// Argon2i hashing with a random salt per invocation.
#[derive(Debug, Clone)]
pub struct Argon2Task {
    params: HashParams,
    argon2_params: Params,
}

impl Argon2Task {
    pub fn new(params: HashParams) -> Result<Self, TaskFailure> {
        let argon2_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| TaskFailure::new(format!("Invalid argon2 parameters: {}", e)))?;

        Ok(Self {
            params,
            argon2_params,
        })
    }

    pub fn params(&self) -> HashParams {
        self.params
    }

    /// True when `parsed` carries exactly this task's algorithm, version and
    /// cost. Verification cost is fixed by the task, never by the hash string.
    fn has_configured_cost(&self, parsed: &PasswordHash<'_>) -> bool {
        if parsed.algorithm != Algorithm::Argon2i.ident()
            || parsed.version != Some(Version::V0x13 as u32)
        {
            return false;
        }
        let Ok(claimed) = Params::try_from(parsed) else {
            return false;
        };

        claimed.m_cost() == self.argon2_params.m_cost()
            && claimed.t_cost() == self.argon2_params.t_cost()
            && claimed.p_cost() == self.argon2_params.p_cost()
            && parsed
                .hash
                .is_some_and(|output| output.len() == Params::DEFAULT_OUTPUT_LEN)
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(
            Algorithm::Argon2i,
            Version::V0x13,
            self.argon2_params.clone(),
        )
    }
}

impl ProtectedTask for Argon2Task {
    type Input = HashInput;
    type Output = HashOutput;

    fn name(&self) -> &'static str {
        "argon2i"
    }

    fn run(&self, input: &HashInput) -> Result<HashOutput, TaskFailure> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()
            .hash_password(input.content.as_bytes(), &salt)
            .map_err(|e| TaskFailure::new(format!("Hashing failed: {}", e)))?;

        Ok(HashOutput {
            hash: hash.to_string(),
        })
    }

    fn verify(&self, output: &HashOutput, input: &HashInput) -> Result<bool, TaskFailure> {
        // A malformed hash cannot match any input.
        let Ok(parsed) = PasswordHash::new(&output.hash) else {
            tracing::debug!("Rejecting malformed hash string");
            return Ok(false);
        };
        if !self.has_configured_cost(&parsed) {
            tracing::debug!(algorithm = %parsed.algorithm, "Rejecting hash with foreign parameters");
            return Ok(false);
        }

        match self.hasher().verify_password(input.content.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(TaskFailure::new(format!("Verification failed: {}", e))),
        }
    }
}
