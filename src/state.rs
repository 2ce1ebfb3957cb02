use crate::gateway::Gateway;

// app's shared state
pub struct AppState {
    pub gateway: Gateway,
}
