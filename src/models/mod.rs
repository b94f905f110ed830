pub mod invoice;
pub mod month;

pub use invoice::{Credentials, InvoiceFields};
pub use month::Month;
