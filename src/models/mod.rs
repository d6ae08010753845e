//! Domain entities shared by the engines and the store interfaces

pub mod enums;
pub mod order;
pub mod position;
pub mod quotes;
pub mod record;
pub mod statement;
pub mod user;

pub use enums::{
    Exchange, OrderStatus, OrderType, PriceType, TradeCategory, TradeType, UserStatus,
};
pub use order::{NewOrder, Order, OrderReceipt};
pub use position::Position;
pub use quotes::Quotes;
pub use record::UserAssetsRecord;
pub use statement::{Costs, Statement};
pub use user::User;
