use std::sync::Arc;

use extension_router::{Router, RouterError};

use super::handler::get_handler;
use super::messages::*;
use super::{LedgerService, ROUTE};

/// Register every ledger message kind and bind the ledger handler map.
pub fn init(router: &mut Router, service: Arc<LedgerService>) -> Result<(), RouterError> {
    router.register_message::<AddLedgerParentAccountMsg>()?;
    router.register_message::<AddLedgerAccountMsg>()?;
    router.register_message::<DeleteLedgerAccountMsg>()?;
    router.register_message::<GetTxBytesMsg>()?;
    router.register_message::<GetRevealPkBytesMsg>()?;
    router.register_message::<SubmitSignedTxMsg>()?;
    router.register_message::<SubmitSignedRevealPkMsg>()?;
    router.register_message::<QueryLedgerAccountsMsg>()?;
    router.register_message::<RenameLedgerAccountMsg>()?;

    router.add_handler(ROUTE, get_handler(service))
}
