// flowmap-domain library entry point
pub mod error;
pub mod flow;
pub mod mapping;
pub mod record;
pub use error::DomainError;
pub use flow::{FlowId, FlowRef, NewFlow, ResolvedFlow, Status};
pub use mapping::{EntryId, MappingEntry, MappingTable, ProviderRef};
pub use record::{Domain, DomainRecord, RecordUpdate};
