use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum ServerEvent {
  PlayerConnected { uuid: String, name: String },
  PlayerDisconnected { uuid: String, name: String },
}

pub fn channel() -> broadcast::Sender<ServerEvent> {
  broadcast::channel(64).0
}
