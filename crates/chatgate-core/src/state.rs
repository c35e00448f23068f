use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::gateway::ChatGateway;
use crate::payment::PaymentService;

/// Everything a request handler needs, shared behind one `Arc`.
pub struct AppState {
    pub gateway: ChatGateway,
    pub auth: Arc<dyn AuthProvider>,
    pub payments: PaymentService,
}
