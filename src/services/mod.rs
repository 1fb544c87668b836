pub mod library;
pub mod oauth;
pub mod operations;
pub mod pipeline;
pub mod playlists;
pub mod session;
pub mod spotify;

pub use oauth::{SpotifyOAuth, TokenEndpoint};
pub use operations::OperationManager;
pub use pipeline::Pipeline;
pub use session::{AuthContext, SessionService, SessionTokens, TokenSource};
pub use spotify::{SpotifyApi, SpotifyClient};
