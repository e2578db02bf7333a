use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmartwayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("unknown lane: {0}")]
    UnknownLane(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
}
