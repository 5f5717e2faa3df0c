use std::sync::Arc;

use extension_router::{HandlerError, HandlerMap, Message};

use super::messages::*;
use super::{LedgerError, LedgerService};

fn reject(kind: &str, e: LedgerError) -> HandlerError {
    tracing::warn!("{} failed: {}", kind, e);
    HandlerError::new(e.code(), e)
}

/// Handler map for the ledger route, one entry per ledger message kind.
pub fn get_handler(service: Arc<LedgerService>) -> HandlerMap {
    HandlerMap::new()
        .on::<AddLedgerParentAccountMsg, _, _>({
            let service = service.clone();
            move |msg: AddLedgerParentAccountMsg| {
                let service = service.clone();
                async move {
                    service
                        .add_parent_account(&msg.path, msg.alias)
                        .await
                        .map_err(|e| reject(AddLedgerParentAccountMsg::KIND, e))
                }
            }
        })
        .on::<AddLedgerAccountMsg, _, _>({
            let service = service.clone();
            move |msg: AddLedgerAccountMsg| {
                let service = service.clone();
                async move {
                    service
                        .add_account(&msg.parent_id, msg.index, msg.alias)
                        .await
                        .map_err(|e| reject(AddLedgerAccountMsg::KIND, e))
                }
            }
        })
        .on::<DeleteLedgerAccountMsg, _, _>({
            let service = service.clone();
            move |msg: DeleteLedgerAccountMsg| {
                let service = service.clone();
                async move {
                    service
                        .delete_account(&msg.id)
                        .await
                        .map_err(|e| reject(DeleteLedgerAccountMsg::KIND, e))?;
                    Ok::<_, HandlerError>(Ack { id: msg.id })
                }
            }
        })
        .on::<GetTxBytesMsg, _, _>({
            let service = service.clone();
            move |msg: GetTxBytesMsg| {
                let service = service.clone();
                async move {
                    service
                        .get_tx_bytes(&msg.account_id, &msg.tx)
                        .await
                        .map_err(|e| reject(GetTxBytesMsg::KIND, e))
                }
            }
        })
        .on::<GetRevealPkBytesMsg, _, _>({
            let service = service.clone();
            move |msg: GetRevealPkBytesMsg| {
                let service = service.clone();
                async move {
                    service
                        .get_reveal_pk_bytes(&msg.account_id)
                        .await
                        .map_err(|e| reject(GetRevealPkBytesMsg::KIND, e))
                }
            }
        })
        .on::<SubmitSignedTxMsg, _, _>({
            let service = service.clone();
            move |msg: SubmitSignedTxMsg| {
                let service = service.clone();
                async move {
                    service
                        .submit_signed_tx(&msg.account_id, &msg.bytes, &msg.signature)
                        .await
                        .map_err(|e| reject(SubmitSignedTxMsg::KIND, e))
                }
            }
        })
        .on::<SubmitSignedRevealPkMsg, _, _>({
            let service = service.clone();
            move |msg: SubmitSignedRevealPkMsg| {
                let service = service.clone();
                async move {
                    service
                        .submit_signed_reveal_pk(&msg.account_id, &msg.bytes, &msg.signature)
                        .await
                        .map_err(|e| reject(SubmitSignedRevealPkMsg::KIND, e))
                }
            }
        })
        .on::<QueryLedgerAccountsMsg, _, _>({
            let service = service.clone();
            move |_msg: QueryLedgerAccountsMsg| {
                let service = service.clone();
                async move { Ok::<_, HandlerError>(service.accounts().await) }
            }
        })
        .on::<RenameLedgerAccountMsg, _, _>(move |msg: RenameLedgerAccountMsg| {
            let service = service.clone();
            async move {
                service
                    .rename_account(&msg.id, msg.alias)
                    .await
                    .map_err(|e| reject(RenameLedgerAccountMsg::KIND, e))
            }
        })
}
