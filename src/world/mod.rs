pub mod config;
pub mod io;
pub mod scope;
pub mod store;

pub use config::{
	ConfigFlags,
	StoreConfig,
};
pub use scope::{
	ReadScope,
	WriteScope,
};
pub use store::{
	DiscardAction,
	TransactionTokens,
	VolumeStore,
};
