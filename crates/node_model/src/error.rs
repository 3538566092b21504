use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("peer field {0} is missing")]
    MissingField(&'static str),
    #[error("resolved service is already assigned to a group")]
    AlreadyAssigned,
    #[error("service advertises group {service_uid}, cannot join group {group_uid}")]
    GroupMismatch {
        group_uid: String,
        service_uid: String,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;
