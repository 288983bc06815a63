//! Basic authentication.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use microlytics_config::Auth;

use super::error::RequestError;

/// Credentials presented by a request.
#[derive(Debug, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Decode an `Authorization: Basic` header. Anything malformed,
/// missing included, is an authentication error.
pub fn parse_header(header: Option<&str>) -> Result<Credentials, RequestError> {
    let header = header.ok_or(RequestError::InvalidAuthentication)?;

    let (scheme, data) = header
        .split_once(' ')
        .ok_or(RequestError::InvalidAuthentication)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(RequestError::InvalidAuthentication);
    }

    let decoded = STANDARD
        .decode(data.trim())
        .map_err(|_| RequestError::InvalidAuthentication)?;
    let decoded = String::from_utf8(decoded).map_err(|_| RequestError::InvalidAuthentication)?;

    let (user, password) = decoded
        .split_once(':')
        .ok_or(RequestError::InvalidAuthentication)?;

    Ok(Credentials {
        user: user.into(),
        password: password.into(),
    })
}

/// Enforce the configured credential, if any.
pub fn check(auth: &Option<Auth>, header: Option<&str>) -> Result<(), RequestError> {
    let auth = match auth {
        Some(auth) if auth.enabled() => auth,
        _ => return Ok(()),
    };

    let credentials = parse_header(header)?;
    if credentials.user == auth.user && credentials.password == auth.password {
        Ok(())
    } else {
        Err(RequestError::InvalidCredentials)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
    }

    fn auth(user: &str, password: &str) -> Option<Auth> {
        Some(Auth {
            user: user.into(),
            password: password.into(),
        })
    }

    #[test]
    fn test_parse_header() {
        let credentials = parse_header(Some(&basic("admin", "secret"))).unwrap();
        assert_eq!(credentials.user, "admin");
        assert_eq!(credentials.password, "secret");

        // Passwords may contain colons.
        let credentials = parse_header(Some(&basic("admin", "a:b:c"))).unwrap();
        assert_eq!(credentials.password, "a:b:c");
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        for header in [None, Some("Basic"), Some("Bearer abc"), Some("Basic !!!")] {
            assert_eq!(
                parse_header(header).unwrap_err(),
                RequestError::InvalidAuthentication
            );
        }
    }

    #[test]
    fn test_check_disabled_without_user() {
        assert!(check(&None, None).is_ok());
        assert!(check(&auth("", "ignored"), None).is_ok());
    }

    #[test]
    fn test_check_credentials() {
        let configured = auth("admin", "secret");

        assert!(check(&configured, Some(&basic("admin", "secret"))).is_ok());
        assert_eq!(
            check(&configured, Some(&basic("admin", "wrong"))).unwrap_err(),
            RequestError::InvalidCredentials
        );
        assert_eq!(
            check(&configured, None).unwrap_err(),
            RequestError::InvalidAuthentication
        );
    }
}
