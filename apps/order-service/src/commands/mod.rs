//! # Commands Module
//!
//! Every operation the service exposes over the request protocol.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs      ◄─── You are here (exports)
//! ├── order.rs    ◄─── create_order, update_order_status, update_payment_status, get_order
//! ├── voucher.rs  ◄─── check_voucher, list_my_vouchers
//! └── loyalty.rs  ◄─── loyalty_profile, points_history, redeem_reward, list_notifications
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Command Flow                                         │
//! │                                                                         │
//! │  {"requestId":"r1","caller":{...},"command":"create_order",             │
//! │   "payload":{"outletId":"kemang-01", ...}}                              │
//! │         │                                                               │
//! │         │ (protocol::Router deserializes the payload)                   │
//! │         ▼                                                               │
//! │  async fn create_order(                                                 │
//! │      db: &DbState,               ◄── Shared pool                        │
//! │      config: &ConfigState,       ◄── Tax, lead time, offsets            │
//! │      notify: &NotificationHandle,◄── Post-commit events                 │
//! │      caller: &CallerContext,     ◄── Authenticated identity             │
//! │      request: CreateOrderRequest,                                       │
//! │  ) -> Result<OrderSummary, ApiError>                                    │
//! │         │                                                               │
//! │         │ (JSON serialization)                                          │
//! │         ▼                                                               │
//! │  {"requestId":"r1","ok":true,"data":{"orderNumber":"KEMA181026-001",..}}│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State Injection
//! Each command takes only the state it needs:
//! ```rust,ignore
//! // Reads only
//! async fn get_order(db: &DbState, caller: &CallerContext, ...)
//!
//! // Writes that emit events
//! async fn update_order_status(db: &DbState, notify: &NotificationHandle, ...)
//! ```

pub mod loyalty;
pub mod order;
pub mod voucher;
