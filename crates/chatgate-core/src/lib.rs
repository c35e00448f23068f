pub mod accounting;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod payment;
pub mod state;

pub use accounting::{Usage, compute_usage, cost_nanos};
pub use auth::{AuthContext, AuthError, AuthProvider, Claims, JwtAuth};
pub use bootstrap::{Bootstrap, bootstrap};
pub use error::GatewayError;
pub use gateway::{ChatEventStream, ChatGateway, MAX_PAGE_SIZE, TITLE_MODEL};
pub use locks::ExchangeLocks;
pub use payment::{
    GatewayOrder, PLANS, PaymentGateway, PaymentService, Plan, RazorpayGateway, verify_signature,
};
pub use state::AppState;
