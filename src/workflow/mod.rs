pub mod export_flow;
pub mod portal_session;
pub mod selectors;
pub mod variant_ctx;

pub use export_flow::{artifact_file_name, ExportFlow};
pub use portal_session::enter_portal;
pub use variant_ctx::VariantCtx;
