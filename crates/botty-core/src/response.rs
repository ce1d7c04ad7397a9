//! Response vocabulary.
//!
//! A handler describes every outbound action as a [`Response`]. There are
//! exactly three kinds: send a new message, edit a previously sent one, or
//! delete one. Previously sent messages are addressed by a logical
//! [`MessageKey`] rather than by transport identifier.
//!
//! ```rust,ignore
//! reply.send(Response::send("Counting...").key("counter")).await?;
//! reply.send(Response::edit("3").key("counter")).await?;
//! reply.send(Response::delete().key("counter")).await?;
//! ```

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::update::MessageId;

// =============================================================================
// MessageKey
// =============================================================================

/// Logical name of a sent message within one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKey(String);

impl MessageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MessageKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for MessageKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

// =============================================================================
// Content
// =============================================================================

/// Where a media file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    /// A transport file id or a URL.
    Remote(String),
    /// Raw file bytes to upload.
    Bytes(Vec<u8>),
}

impl From<&str> for MediaSource {
    fn from(source: &str) -> Self {
        Self::Remote(source.to_string())
    }
}

impl From<String> for MediaSource {
    fn from(source: String) -> Self {
        Self::Remote(source)
    }
}

impl From<Vec<u8>> for MediaSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// A point on the map, in degrees.
///
/// Compared and hashed by bit pattern so that it can live inside [`Content`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn bits(&self) -> (u64, u64) {
        (self.latitude.to_bits(), self.longitude.to_bits())
    }
}

impl PartialEq for GeoPoint {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for GeoPoint {}

impl Hash for GeoPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Kind of poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollKind {
    #[default]
    Regular,
    /// A quiz with exactly one correct option.
    Quiz,
}

/// Animated emoji of a dice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceEmoji {
    #[default]
    Die,
    Darts,
    Basketball,
    Football,
    SlotMachine,
    Bowling,
}

impl DiceEmoji {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Die => "🎲",
            Self::Darts => "🎯",
            Self::Basketball => "🏀",
            Self::Football => "⚽",
            Self::SlotMachine => "🎰",
            Self::Bowling => "🎳",
        }
    }
}

/// The visible body of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Photo {
        source: MediaSource,
        #[serde(default)]
        caption: Option<String>,
    },
    Document {
        source: MediaSource,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        caption: Option<String>,
    },
    /// Music, shown with a player.
    Audio {
        source: MediaSource,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        performer: Option<String>,
        #[serde(default)]
        duration_secs: Option<u32>,
    },
    Video {
        source: MediaSource,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        duration_secs: Option<u32>,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        #[serde(default)]
        supports_streaming: bool,
    },
    /// A voice note.
    Voice {
        source: MediaSource,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        duration_secs: Option<u32>,
    },
    Location {
        point: GeoPoint,
        /// Radius of uncertainty, in meters.
        #[serde(default)]
        horizontal_accuracy: Option<u32>,
        /// Keeps the location live for this long.
        #[serde(default)]
        live_period_secs: Option<u32>,
        #[serde(default)]
        heading: Option<u16>,
        #[serde(default)]
        proximity_alert_radius: Option<u32>,
    },
    Venue {
        point: GeoPoint,
        title: String,
        address: String,
        #[serde(default)]
        foursquare_id: Option<String>,
        #[serde(default)]
        google_place_id: Option<String>,
    },
    Contact {
        phone_number: String,
        first_name: String,
        #[serde(default)]
        last_name: Option<String>,
        #[serde(default)]
        vcard: Option<String>,
    },
    Poll {
        question: String,
        options: Vec<String>,
        #[serde(default)]
        poll_kind: PollKind,
        #[serde(default = "anonymous_default")]
        anonymous: bool,
        #[serde(default)]
        allows_multiple_answers: bool,
        /// Index of the right option of a quiz.
        #[serde(default)]
        correct_option: Option<usize>,
        #[serde(default)]
        explanation: Option<String>,
        #[serde(default)]
        open_period_secs: Option<u32>,
    },
    Dice {
        #[serde(default)]
        emoji: DiceEmoji,
    },
}

fn anonymous_default() -> bool {
    true
}

impl Content {
    /// Creates a text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a photo body.
    pub fn photo(source: impl Into<MediaSource>) -> Self {
        Self::Photo {
            source: source.into(),
            caption: None,
        }
    }

    /// Creates a document body.
    pub fn document(source: impl Into<MediaSource>) -> Self {
        Self::Document {
            source: source.into(),
            file_name: None,
            caption: None,
        }
    }

    pub fn audio(source: impl Into<MediaSource>) -> Self {
        Self::Audio {
            source: source.into(),
            caption: None,
            title: None,
            performer: None,
            duration_secs: None,
        }
    }

    pub fn video(source: impl Into<MediaSource>) -> Self {
        Self::Video {
            source: source.into(),
            caption: None,
            duration_secs: None,
            width: None,
            height: None,
            supports_streaming: false,
        }
    }

    pub fn voice(source: impl Into<MediaSource>) -> Self {
        Self::Voice {
            source: source.into(),
            caption: None,
            duration_secs: None,
        }
    }

    pub fn location(latitude: f64, longitude: f64) -> Self {
        Self::Location {
            point: GeoPoint::new(latitude, longitude),
            horizontal_accuracy: None,
            live_period_secs: None,
            heading: None,
            proximity_alert_radius: None,
        }
    }

    pub fn venue(
        latitude: f64,
        longitude: f64,
        title: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self::Venue {
            point: GeoPoint::new(latitude, longitude),
            title: title.into(),
            address: address.into(),
            foursquare_id: None,
            google_place_id: None,
        }
    }

    pub fn contact(phone_number: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self::Contact {
            phone_number: phone_number.into(),
            first_name: first_name.into(),
            last_name: None,
            vcard: None,
        }
    }

    /// Creates an anonymous single-answer poll.
    pub fn poll<I, S>(question: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Poll {
            question: question.into(),
            options: options.into_iter().map(Into::into).collect(),
            poll_kind: PollKind::Regular,
            anonymous: true,
            allows_multiple_answers: false,
            correct_option: None,
            explanation: None,
            open_period_secs: None,
        }
    }

    /// Creates a quiz whose right answer is `options[correct]`.
    pub fn quiz<I, S>(question: impl Into<String>, options: I, correct: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut quiz = Self::poll(question, options);
        if let Self::Poll {
            poll_kind,
            correct_option,
            ..
        } = &mut quiz
        {
            *poll_kind = PollKind::Quiz;
            *correct_option = Some(correct);
        }
        quiz
    }

    pub fn dice(emoji: DiceEmoji) -> Self {
        Self::Dice { emoji }
    }

    /// Sets the caption of a media body. Has no effect on other kinds.
    pub fn caption(mut self, text: impl Into<String>) -> Self {
        if let Some(caption) = self.caption_mut() {
            *caption = Some(text.into());
        }
        self
    }

    /// Sets the displayed file name of a document.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        if let Self::Document { file_name, .. } = &mut self {
            *file_name = Some(name.into());
        }
        self
    }

    /// Sets the playing time of audio, video and voice bodies.
    pub fn duration(mut self, secs: u32) -> Self {
        match &mut self {
            Self::Audio { duration_secs, .. }
            | Self::Video { duration_secs, .. }
            | Self::Voice { duration_secs, .. } => *duration_secs = Some(secs),
            _ => {}
        }
        self
    }

    /// Keeps a location live for `secs`.
    pub fn live_for(mut self, secs: u32) -> Self {
        if let Self::Location {
            live_period_secs, ..
        } = &mut self
        {
            *live_period_secs = Some(secs);
        }
        self
    }

    /// Short name of the variant for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Photo { .. } => "photo",
            Self::Document { .. } => "document",
            Self::Audio { .. } => "audio",
            Self::Video { .. } => "video",
            Self::Voice { .. } => "voice",
            Self::Location { .. } => "location",
            Self::Venue { .. } => "venue",
            Self::Contact { .. } => "contact",
            Self::Poll { .. } => "poll",
            Self::Dice { .. } => "dice",
        }
    }

    /// Text shown to the user: the text body, media caption, poll question
    /// or venue title.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Poll { question, .. } => Some(question),
            Self::Venue { title, .. } => Some(title),
            Self::Photo { caption, .. }
            | Self::Document { caption, .. }
            | Self::Audio { caption, .. }
            | Self::Video { caption, .. }
            | Self::Voice { caption, .. } => caption.as_deref(),
            Self::Location { .. } | Self::Contact { .. } | Self::Dice { .. } => None,
        }
    }

    fn caption_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            Self::Photo { caption, .. }
            | Self::Document { caption, .. }
            | Self::Audio { caption, .. }
            | Self::Video { caption, .. }
            | Self::Voice { caption, .. } => Some(caption),
            _ => None,
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

// =============================================================================
// SendOptions
// =============================================================================

/// How the transport should interpret formatting in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParseMode {
    Html,
    Markdown,
    MarkdownV2,
}

/// One button of an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons attached under a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row of buttons.
    pub fn row(mut self, buttons: impl IntoIterator<Item = InlineButton>) -> Self {
        self.rows.push(buttons.into_iter().collect());
        self
    }
}

/// Delivery options forwarded to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default)]
    pub parse_mode: Option<ParseMode>,
    #[serde(default)]
    pub reply_markup: Option<InlineKeyboard>,
    #[serde(default)]
    pub disable_notification: bool,
    #[serde(default)]
    pub protect_content: bool,
}

// =============================================================================
// Response
// =============================================================================

/// Free-form data stored with a sent message in the registry.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One outbound action produced by a handler.
///
/// `handler` acts on behalf of another handler: the response uses that
/// handler's implicit key instead of the producing handler's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Always sends a new message and remembers it under `key`.
    Send {
        content: Content,
        options: SendOptions,
        key: Option<MessageKey>,
        handler: Option<String>,
        metadata: Metadata,
    },
    /// Edits the message remembered under `key`, or `message_id` when given.
    Edit {
        content: Content,
        options: SendOptions,
        key: Option<MessageKey>,
        handler: Option<String>,
        message_id: Option<MessageId>,
        metadata: Metadata,
    },
    /// Deletes the message remembered under `key`.
    Delete {
        key: Option<MessageKey>,
        handler: Option<String>,
    },
}

impl Response {
    /// Creates a send response.
    pub fn send(content: impl Into<Content>) -> Self {
        Self::Send {
            content: content.into(),
            options: SendOptions::default(),
            key: None,
            handler: None,
            metadata: Metadata::new(),
        }
    }

    /// Creates an edit response.
    pub fn edit(content: impl Into<Content>) -> Self {
        Self::Edit {
            content: content.into(),
            options: SendOptions::default(),
            key: None,
            handler: None,
            message_id: None,
            metadata: Metadata::new(),
        }
    }

    /// Creates a delete response.
    pub fn delete() -> Self {
        Self::Delete {
            key: None,
            handler: None,
        }
    }

    /// Addresses the response to a logical message key.
    pub fn key(mut self, message_key: impl Into<MessageKey>) -> Self {
        match &mut self {
            Self::Send { key, .. } | Self::Edit { key, .. } | Self::Delete { key, .. } => {
                *key = Some(message_key.into());
            }
        }
        self
    }

    /// Addresses the response to the messages of the handler named `name`.
    ///
    /// An edit looks for that handler's message first and falls back to the
    /// producing handler's own. An explicit key still wins.
    pub fn handler(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Send { handler, .. }
            | Self::Edit { handler, .. }
            | Self::Delete { handler, .. } => {
                *handler = Some(name.into());
            }
        }
        self
    }

    /// Targets an edit at a known transport message id.
    ///
    /// Takes priority over the key when looking up the message to edit.
    pub fn message_id(mut self, id: MessageId) -> Self {
        if let Self::Edit { message_id, .. } = &mut self {
            *message_id = Some(id);
        }
        self
    }

    /// Stores `value` under `name` with the registry entry of the message.
    pub fn meta(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert(name.into(), value.into());
        }
        self
    }

    /// Replaces the metadata stored with the message.
    pub fn metadata(mut self, new_metadata: Metadata) -> Self {
        if let Some(metadata) = self.metadata_mut() {
            *metadata = new_metadata;
        }
        self
    }

    /// Replaces the delivery options.
    pub fn options(mut self, new_options: SendOptions) -> Self {
        if let Some(options) = self.options_mut() {
            *options = new_options;
        }
        self
    }

    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        if let Some(options) = self.options_mut() {
            options.parse_mode = Some(mode);
        }
        self
    }

    pub fn reply_markup(mut self, keyboard: InlineKeyboard) -> Self {
        if let Some(options) = self.options_mut() {
            options.reply_markup = Some(keyboard);
        }
        self
    }

    pub fn silent(mut self) -> Self {
        if let Some(options) = self.options_mut() {
            options.disable_notification = true;
        }
        self
    }

    pub fn protected(mut self) -> Self {
        if let Some(options) = self.options_mut() {
            options.protect_content = true;
        }
        self
    }

    /// The explicit key, if any.
    pub fn explicit_key(&self) -> Option<&MessageKey> {
        match self {
            Self::Send { key, .. } | Self::Edit { key, .. } | Self::Delete { key, .. } => {
                key.as_ref()
            }
        }
    }

    /// The handler the response acts for, if not the producing one.
    pub fn target_handler(&self) -> Option<&str> {
        match self {
            Self::Send { handler, .. }
            | Self::Edit { handler, .. }
            | Self::Delete { handler, .. } => handler.as_deref(),
        }
    }

    /// Short name of the variant for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
        }
    }

    fn options_mut(&mut self) -> Option<&mut SendOptions> {
        match self {
            Self::Send { options, .. } | Self::Edit { options, .. } => Some(options),
            Self::Delete { .. } => None,
        }
    }

    fn metadata_mut(&mut self) -> Option<&mut Metadata> {
        match self {
            Self::Send { metadata, .. } | Self::Edit { metadata, .. } => Some(metadata),
            Self::Delete { .. } => None,
        }
    }
}

/// Hash of the rendered message, used to skip edits that change nothing.
pub fn fingerprint(content: &Content, options: &SendOptions) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    options.hash(&mut hasher);
    hasher.finish()
}
