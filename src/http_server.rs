use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

use crate::config::ConfigUpdate;
use crate::error::Error;
use crate::slideshow_controller::{SlideshowCommand, SlideshowHandle};

#[derive(Debug)]
struct InvalidRequest(String);
impl warp::reject::Reject for InvalidRequest {}

#[derive(Debug)]
struct ControllerUnavailable;
impl warp::reject::Reject for ControllerUnavailable {}

#[derive(Debug, Deserialize, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T, message: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.to_string(),
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BrightnessRequest {
    level: u8,
}

fn rejection(err: Error) -> Rejection {
    match err {
        Error::InvalidConfig(msg) => warp::reject::custom(InvalidRequest(msg)),
        _ => warp::reject::custom(ControllerUnavailable),
    }
}

fn with_handle(handle: SlideshowHandle) -> impl Filter<Extract = (SlideshowHandle,), Error = Infallible> + Clone {
    warp::any().map(move || handle.clone())
}

async fn dispatch(
    handle: SlideshowHandle,
    command: SlideshowCommand,
    message: &'static str,
) -> Result<impl Reply, Rejection> {
    handle.send(command).await.map_err(rejection)?;
    Ok(reply::json(&ApiResponse::success((), message)))
}

async fn get_status(handle: SlideshowHandle) -> Result<impl Reply, Rejection> {
    let status = handle.status().await.map_err(rejection)?;
    Ok(reply::json(&ApiResponse::success(status, "Status retrieved")))
}

async fn apply_config(update: ConfigUpdate, handle: SlideshowHandle) -> Result<impl Reply, Rejection> {
    handle.configure(update).await.map_err(rejection)?;
    Ok(reply::json(&ApiResponse::success((), "Configuration applied")))
}

async fn set_profile(req: ProfileRequest, handle: SlideshowHandle) -> Result<impl Reply, Rejection> {
    if req.name.trim().is_empty() {
        return Err(warp::reject::custom(InvalidRequest("profile name is empty".into())));
    }
    dispatch(handle, SlideshowCommand::SetProfile(req.name), "Profile switch requested").await
}

async fn get_brightness(handle: SlideshowHandle) -> Result<impl Reply, Rejection> {
    let level = handle.brightness().await.map_err(rejection)?;
    Ok(reply::json(&ApiResponse::success(
        serde_json::json!({ "level": level }),
        "Brightness retrieved",
    )))
}

async fn set_brightness(req: BrightnessRequest, handle: SlideshowHandle) -> Result<impl Reply, Rejection> {
    if req.level > 100 {
        return Err(warp::reject::custom(InvalidRequest(format!(
            "brightness must be 0..=100, got {}",
            req.level
        ))));
    }
    dispatch(handle, SlideshowCommand::SetBrightness(req.level), "Brightness updated").await
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(InvalidRequest(msg)) = err.find() {
        (StatusCode::BAD_REQUEST, msg.clone())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<ControllerUnavailable>().is_some() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Error::ControllerGone.to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::warn!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
    };

    Ok(reply::with_status(
        reply::json(&ApiResponse::<()>::failure(&message)),
        code,
    ))
}

pub fn routes(handle: SlideshowHandle) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| reply::json(&ApiResponse::success("healthy", "Slideshow is running")));

    let version = warp::path!("version").and(warp::get()).map(|| {
        let version_info = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "commit_hash": env!("GIT_COMMIT_HASH"),
            "commit_short": env!("GIT_COMMIT_SHORT"),
            "branch": env!("GIT_BRANCH"),
            "build_time": env!("BUILD_TIME")
        });
        reply::json(&ApiResponse::success(version_info, "Version information"))
    });

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_handle(handle.clone()))
        .and_then(get_status);

    let configure = warp::path!("configure")
        .and(warp::post())
        .and(warp::body::json::<ConfigUpdate>())
        .and(with_handle(handle.clone()))
        .and_then(apply_config);

    let refresh = warp::path!("refresh")
        .and(warp::post())
        .and(with_handle(handle.clone()))
        .and_then(|handle: SlideshowHandle| dispatch(handle, SlideshowCommand::Refresh, "Refresh requested"));

    let next = warp::path!("next")
        .and(warp::post())
        .and(with_handle(handle.clone()))
        .and_then(|handle: SlideshowHandle| dispatch(handle, SlideshowCommand::Next, "Advanced to next image"));

    let previous = warp::path!("previous")
        .and(warp::post())
        .and(with_handle(handle.clone()))
        .and_then(|handle: SlideshowHandle| dispatch(handle, SlideshowCommand::Previous, "Went back one image"));

    let profile = warp::path!("profile")
        .and(warp::post())
        .and(warp::body::json::<ProfileRequest>())
        .and(with_handle(handle.clone()))
        .and_then(set_profile);

    let start = warp::path!("slideshow" / "start")
        .and(warp::post())
        .and(with_handle(handle.clone()))
        .and_then(|handle: SlideshowHandle| dispatch(handle, SlideshowCommand::StartSlideshow, "Slideshow started"));

    let exit = warp::path!("slideshow" / "exit")
        .and(warp::post())
        .and(with_handle(handle.clone()))
        .and_then(|handle: SlideshowHandle| dispatch(handle, SlideshowCommand::ExitSlideshow, "Slideshow exited"));

    let brightness_get = warp::path!("brightness")
        .and(warp::get())
        .and(with_handle(handle.clone()))
        .and_then(get_brightness);

    let brightness_put = warp::path!("brightness")
        .and(warp::put())
        .and(warp::body::json::<BrightnessRequest>())
        .and(with_handle(handle))
        .and_then(set_brightness);

    let api = warp::path("api")
        .and(
            health
                .or(version)
                .or(status)
                .or(configure)
                .or(refresh)
                .or(next)
                .or(previous)
                .or(profile)
                .or(start)
                .or(exit)
                .or(brightness_get)
                .or(brightness_put),
        )
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type"])
                .allow_methods(vec!["GET", "POST", "PUT"]),
        );

    let root = warp::path::end().map(|| reply::html(INDEX_HTML));

    root.or(api).recover(handle_rejection)
}

pub async fn run_http_server(port: u16, handle: SlideshowHandle) {
    tracing::info!("Starting HTTP server on port {}", port);
    warp::serve(routes(handle)).run(([0, 0, 0, 0], port)).await;
}

const INDEX_HTML: &str = r#"<html>
<head><title>Photo Daydream</title></head>
<body>
<h1>Photo Daydream</h1>
<p>API endpoints:</p>
<ul>
<li>GET /api/health - Health check</li>
<li>GET /api/version - Version information</li>
<li>GET /api/status - Current image and playlist position</li>
<li>POST /api/configure - Apply a configuration update</li>
<li>POST /api/refresh - Reload the playlist</li>
<li>POST /api/next - Next image</li>
<li>POST /api/previous - Previous image</li>
<li>POST /api/profile - Switch profile by name</li>
<li>POST /api/slideshow/start - Show the slideshow</li>
<li>POST /api/slideshow/exit - Hide the slideshow</li>
<li>GET /api/brightness - Read brightness</li>
<li>PUT /api/brightness - Set brightness (0-100)</li>
</ul>
</body>
</html>
"#;
