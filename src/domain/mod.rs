mod email_address;
mod model;
mod parameter;
mod task;

pub use email_address::EmailAddress;
pub use model::ModelSpec;
pub use parameter::ParameterKind;
pub use parameter::ParameterSpec;
pub use parameter::ParameterValue;
pub use parameter::ValidationError;
pub use task::Task;
pub use task::TaskState;
