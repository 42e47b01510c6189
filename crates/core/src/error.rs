use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid value: {0}")]
    Value(#[from] notifier_types::ValueError),

    #[error("no location specified")]
    NoLocationSpecified,
    #[error("district not found: {0}")]
    DistrictNotFound(String),
    #[error("invalid pincode: {0}")]
    InvalidPincode(String),
    #[error("external query failed: {0}")]
    ExternalQueryFailed(String),
    #[error("subscriber not found: {0}")]
    SubscriberNotFound(String),
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("no pending OTP request for {0}")]
    OtpNotRequested(String),
    #[error("mobile number {0} has not been verified")]
    NotVerified(String),

    #[error(
        "failed to load location index (path: {path}): {reason}",
        path = path.display()
    )]
    LocationIndexLoad { path: PathBuf, reason: String },
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
}

impl NotifierError {
    /// Short, human-readable text suitable for replying to a chat user.
    ///
    /// Internal failures collapse to a generic message; the detail goes to the log instead.
    pub fn user_message(&self) -> String {
        match self {
            NotifierError::NoLocationSpecified => {
                "No location specified. Send a pincode or district name, or run setup first."
                    .into()
            }
            NotifierError::DistrictNotFound(keyword) => format!("District Not Found: {keyword}"),
            NotifierError::InvalidPincode(pin) => format!("Invalid Pincode {pin}"),
            NotifierError::ExternalQueryFailed(_) => {
                "Could not reach the vaccination service, please try again later.".into()
            }
            NotifierError::SubscriberNotFound(_) => "You are not subscribed.".into(),
            NotifierError::DeliveryFailed(_) => "Could not deliver the message.".into(),
            NotifierError::OtpNotRequested(mobile) => {
                format!("No pending OTP for {mobile}, request one with the otp command first.")
            }
            NotifierError::NotVerified(mobile) => {
                format!("{mobile} is not verified, use the otp and verify commands first.")
            }
            NotifierError::InvalidInput(reason) => format!("Invalid input: {reason}"),
            NotifierError::Value(e) => format!("Invalid input: {e}"),
            _ => "Something went wrong, please try again later.".into(),
        }
    }
}

pub type NotifierResult<T> = std::result::Result<T, NotifierError>;
