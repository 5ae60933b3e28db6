pub mod approval;
pub mod directory;
pub mod document;
pub mod document_type;
pub mod role;
