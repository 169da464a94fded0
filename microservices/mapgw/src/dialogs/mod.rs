//! Dialog flavors of the short-message gateway

mod forward_mo;
mod forward_mt;
mod send_ri;

pub use forward_mo::ForwardMoSm;
pub use forward_mt::ForwardMtSm;
pub use send_ri::SendRiForSm;
