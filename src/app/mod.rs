// Application layer - Use case interactors

pub mod container;
pub mod scramble_interactor;

// Re-export interactors
pub use container::{AppContainer, DefaultAppContainer};
pub use scramble_interactor::{
    Job, ScrambleInteractor, ScrambleOutcome, ScrambleRequest, UploadHandoff, UploadPolicy,
    UploadedAsset,
};
