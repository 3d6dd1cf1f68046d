use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LiveError {
    #[snafu(display("cannot connect the live channel without a credential on `{stage}`"))]
    MissingCredential { stage: &'static str },
    #[snafu(display("live channel endpoint '{url}' is not a valid URL"))]
    InvalidUrl {
        stage: &'static str,
        url: String,
        source: url::ParseError,
    },
}

pub type LiveResult<T> = Result<T, LiveError>;
