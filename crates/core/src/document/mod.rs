//! Document layer: byte source, xref resolution, object store, security and
//! the page tree.
//!
//! - `source` - header detection and stream byte ranges
//! - `xref` - cross-reference chain and rebuild-by-scan
//! - `store` - object cache by number
//! - `reader` - `PdfReader`, lazy and eager materialization
//! - `security` - standard and public-key security handlers
//! - `saslprep` - RFC 4013 password preparation
//! - `page` - page tree walk with inheritance

pub mod page;
pub mod reader;
pub mod saslprep;
pub mod security;
pub mod source;
pub mod store;
pub mod xref;

pub use page::{DEFAULT_MEDIA_BOX, PdfPage};
pub use reader::{PdfReader, ReaderOptions};
pub use saslprep::saslprep;
pub use security::{
    Credentials, PASSWORD_PADDING, PublicKeySecurityHandler, RecipientDecryptor, SecurityHandler,
    StandardSecurityHandler, create_security_handler,
};
pub use source::PdfSource;
pub use store::ObjectStore;
pub use xref::{MAX_OBJECT_NUMBER, XrefEntry, XrefResolver, XrefTable};
