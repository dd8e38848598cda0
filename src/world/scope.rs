use std::ops::Deref;

use crate::{
	math::IntBox,
	octree::NodeId,
	VoxResult,
};

use super::store::{
	TransactionTokens,
	VolumeStore,
};

macro_rules! __scope_type {
	($(#[$attr:meta])* $name:ident, $end:ident) => {
		$(#[$attr])*
		pub struct $name<'a> {
			store: &'a VolumeStore,
			bounds: IntBox,
			tokens: Option<TransactionTokens>,
		}

		impl<'a> $name<'a> {
			pub(super) fn new(store: &'a VolumeStore, bounds: IntBox, tokens: TransactionTokens) -> Self {
				Self {
					store,
					bounds,
					tokens: Some(tokens),
				}
			}

			pub fn bounds(&self) -> IntBox {
				self.bounds
			}

			/// The leaves held by this scope.
			pub fn leaves(&self) -> &[NodeId] {
				self.tokens.as_ref().map(TransactionTokens::ids).unwrap_or_default()
			}

			/// Ends the transaction now and reports release failures.
			pub fn end(mut self) -> VoxResult<()> {
				match self.tokens.take() {
					Some(tokens) => self.store.$end(tokens),
					None => Ok(()),
				}
			}
		}

		impl<'a> Deref for $name<'a> {
			type Target = VolumeStore;

			fn deref(&self) -> &Self::Target {
				self.store
			}
		}

		impl<'a> Drop for $name<'a> {
			fn drop(&mut self) {
				if let Some(tokens) = self.tokens.take() {
					if let Err(err) = self.store.$end(tokens) {
						log::error!("failed to end scope on {:?}: {err}", self.bounds);
					}
				}
			}
		}
	};
}

__scope_type!(
	/// A read transaction that ends when dropped.
	ReadScope, end_read
);

__scope_type!(
	/// A write transaction that ends when dropped.
	WriteScope, end_write
);
