use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to spawn decoder process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("decoder restart budget exhausted after {attempts} attempts")]
    RestartBudgetExhausted { attempts: u32 },

    #[error("decoder process is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, DecodeError>;
