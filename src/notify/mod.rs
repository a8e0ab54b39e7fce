pub mod channels;
pub mod directory;
pub mod dispatcher;
pub mod email;
pub mod gate;
pub mod message;

pub use channels::{
    BrowserChannel, BrowserPush, CenterMessage, HttpMessageCenter, InMemoryMessageCenter,
    MessageCenter, NotificationCenterChannel, NotificationChannel, NotificationError,
};
pub use directory::{DirectoryError, DirectoryUser, HttpUserDirectory, StaticDirectory, UserDirectory};
pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use email::{EmailChannel, Mailer, OutboxMailer, SmtpMailer, SmtpSettings};
pub use message::{Notice, NoticeKind};
