mod couple_names;
mod letter;
mod letter_message;
mod letter_slug;
mod letter_status;
mod music_link;
mod new_letter;
mod payer_email;
mod payer_name;
mod payment_status;
mod plan;
mod relationship_start;
mod staged_upload;

pub use couple_names::CoupleNames;
pub use letter::Letter;
pub use letter_message::LetterMessage;
pub use letter_slug::{slug_regex, LetterSlug};
pub use letter_status::LetterStatus;
pub use music_link::MusicLink;
pub use new_letter::NewLetter;
pub use payer_email::PayerEmail;
pub use payer_name::PayerName;
pub use payment_status::PaymentStatus;
pub use plan::Plan;
pub use relationship_start::RelationshipStart;
pub use staged_upload::{StagedUpload, StagedUploadStatus};
