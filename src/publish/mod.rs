pub mod collaborators;
pub mod lock;
pub mod service;

pub use collaborators::{
    MenuRegistrar, RecordingMenuRegistrar, RecordingTemplateProvisioner, TemplateHandle,
    TemplateProvisioner, TemplateUsage,
};
pub use lock::EntityLockService;
pub use service::{PublishResult, PublishingService, WithdrawMode};
