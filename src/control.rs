use crate::error::SwitchError;
use crate::switch::SourceSwitch;
use crate::types::{ClientMessage, ServerEvent};
use tracing::{error, info, warn};

/// Parse and handle one inbound text frame.
///
/// Returns the reply meant for the sender only, if any. Successful switches
/// reach every session through the broadcaster instead.
pub async fn handle_text(text: &str, switch: &SourceSwitch) -> Option<ServerEvent> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => handle_client_message(msg, switch).await,
        Err(e) => {
            warn!("Failed to parse client message: {}", e);
            Some(ServerEvent::error(format!("Invalid message format: {}", e)))
        }
    }
}

pub async fn handle_client_message(
    msg: ClientMessage,
    switch: &SourceSwitch,
) -> Option<ServerEvent> {
    match msg {
        ClientMessage::SelectDataset { dataset_index } => {
            info!("Client requested dataset {}", dataset_index);
            match switch.select_replay_by_id(dataset_index).await {
                Ok(descriptor) => {
                    info!(
                        "Selected and started streaming dataset: {}",
                        descriptor.relative_path
                    );
                    None
                }
                Err(e) => Some(reply_for(e, switch)),
            }
        }

        ClientMessage::SelectLive => {
            info!("Client requested the live device");
            match switch.select_live().await {
                Ok(()) => None,
                Err(e) => Some(reply_for(e, switch)),
            }
        }
    }
}

fn reply_for(err: SwitchError, switch: &SourceSwitch) -> ServerEvent {
    match err {
        SwitchError::UnknownDataset(index) => {
            warn!("Rejected dataset index {}", index);
            ServerEvent::error(format!(
                "Dataset index {} is out of range (1-{})",
                index,
                switch.catalog().len()
            ))
        }
        other => {
            error!("Source switch failed: {}", other);
            ServerEvent::error(other.to_string())
        }
    }
}
