pub mod assets;
pub mod composer;
pub mod error;
pub mod export;
pub mod identity;
pub mod scene;
pub mod session;
pub mod settings;
pub mod templates;
