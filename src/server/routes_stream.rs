//! Playback routes: open contexts, serve playlists, segments, and
//! progressive content.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use vf_core::config::ContextOptions;
use vf_core::{Error, Format, HwAccel, ProbeInfo};

use crate::context::Context;
use crate::streaming::{Content, EngineStatus, Stream};

use super::{AppContext, AppError};

type RouteResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    /// Source file path on the gateway host.
    pub path: PathBuf,
    #[serde(default)]
    pub format: Option<Format>,
    #[serde(default)]
    pub hw_accel: Option<HwAccel>,
    /// Force transcoding even when the source is already compatible.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub id: String,
    pub url: String,
    pub format: Format,
    pub mime_type: &'static str,
    pub transcode: bool,
    pub info: ProbeInfo,
}

/// Open a playback context and report where to fetch it.
pub async fn play(
    State(ctx): State<AppContext>,
    Json(request): Json<PlayRequest>,
) -> RouteResult<Json<PlayResponse>> {
    let id = Uuid::new_v4().to_string();

    let mut options = ContextOptions {
        format: request.format,
        hw_accel: request.hw_accel,
        specs: None,
    };
    if request.force {
        options.specs = Some(vec![vf_core::StreamSpec::compatible()]);
    }

    let context = ctx
        .service
        .create_context(id.clone(), request.path, options)
        .await?;

    let format = context.format();
    let url = match format {
        Format::Hls => format!("/video/{id}/index.m3u8"),
        Format::Mp4 | Format::Ts => format!("/video/{id}/content"),
    };
    let transcode = context
        .default_stream()
        .map(|s| s.need_transcode())
        .unwrap_or(false);

    Ok(Json(PlayResponse {
        url,
        format,
        mime_type: format.mime_type(),
        transcode,
        info: (**context.probe()).clone(),
        id,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SpecQuery {
    pub spec: Option<String>,
}

/// HLS entry point: the master playlist for multi-variant contexts, the
/// single variant's media playlist otherwise.
pub async fn playlist(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(query): Query<SpecQuery>,
) -> RouteResult<Response> {
    let context = lookup(&ctx, &id)?;
    if context.format() != Format::Hls {
        return Err(Error::Validation("playlists exist only for HLS contexts".into()).into());
    }

    if let Some(spec) = query.spec {
        let stream = stream_of(&context, &spec)?;
        return media_playlist_response(&context, &stream);
    }

    if context.streams().len() > 1 {
        let variants: Vec<_> = context.streams().iter().map(|s| s.variant()).collect();
        let m3u8 = vf_media::render_master_playlist(&variants, |v| {
            format!("/video/{id}/{}/index.m3u8", v.name)
        });
        return playlist_response(&context, m3u8);
    }

    let stream = context
        .default_stream()
        .ok_or_else(|| Error::not_found("stream", &id))?;
    media_playlist_response(&context, &stream)
}

/// One variant's media playlist.
pub async fn variant_playlist(
    State(ctx): State<AppContext>,
    Path((id, spec)): Path<(String, String)>,
) -> RouteResult<Response> {
    let context = lookup(&ctx, &id)?;
    let stream = stream_of(&context, &spec)?;
    media_playlist_response(&context, &stream)
}

/// One MPEG-TS segment, e.g. `GET /video/{id}/{spec}/4.ts`.
pub async fn segment(
    State(ctx): State<AppContext>,
    Path((id, spec, segment)): Path<(String, String, String)>,
) -> RouteResult<Response> {
    let index: u32 = segment
        .strip_suffix(".ts")
        .unwrap_or(&segment)
        .parse()
        .map_err(|_| Error::not_found("segment", &segment))?;

    let context = lookup(&ctx, &id)?;
    let stream = stream_of(&context, &spec)?;

    let reader = stream.chunk(index).await?;
    let body = Body::from_stream(reader.into_stream());

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, Format::Ts.mime_type())
        .body(body)
        .unwrap())
}

/// Progressive content: the whole stream as one MP4/TS body.
pub async fn content(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(query): Query<SpecQuery>,
) -> RouteResult<Response> {
    let context = lookup(&ctx, &id)?;
    let stream = match query.spec {
        Some(spec) => stream_of(&context, &spec)?,
        None => context
            .default_stream()
            .ok_or_else(|| Error::not_found("stream", &id))?,
    };

    let body = match stream.content().await? {
        Content::File(file) => Body::from_stream(ReaderStream::new(file)),
        Content::Pipe(stdout) => Body::from_stream(ReaderStream::new(stdout)),
    };

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, context.mime_type())
        .body(body)
        .unwrap())
}

#[derive(Debug, Serialize)]
pub struct ContextStatus {
    pub id: String,
    pub format: Format,
    pub idle_secs: i64,
    pub streams: Vec<StreamStatus>,
}

#[derive(Debug, Serialize)]
pub struct StreamStatus {
    pub name: String,
    pub transcode: bool,
    pub engine: Option<EngineStatus>,
}

/// Gateway introspection: open contexts and their engine windows.
pub async fn status(State(ctx): State<AppContext>) -> Json<Vec<ContextStatus>> {
    let mut out = Vec::new();
    for id in ctx.service.context_ids() {
        if let Some(context) = ctx.service.context(&id) {
            out.push(ContextStatus {
                id: context.id().to_string(),
                format: context.format(),
                idle_secs: context.idle_secs(),
                streams: context
                    .streams()
                    .iter()
                    .map(|s| StreamStatus {
                        name: s.name().to_string(),
                        transcode: s.need_transcode(),
                        engine: s.engine_status(),
                    })
                    .collect(),
            });
        }
    }
    Json(out)
}

fn lookup(ctx: &AppContext, id: &str) -> Result<Arc<Context>, AppError> {
    ctx.service
        .context(id)
        .ok_or_else(|| Error::not_found("context", id).into())
}

fn stream_of(context: &Arc<Context>, spec: &str) -> Result<Arc<Stream>, AppError> {
    context
        .stream(spec)
        .ok_or_else(|| Error::not_found("stream", spec).into())
}

fn media_playlist_response(context: &Arc<Context>, stream: &Arc<Stream>) -> RouteResult<Response> {
    let id = context.id().to_string();
    let name = stream.name().to_string();
    let m3u8 = stream.media_playlist(|index| format!("/video/{id}/{name}/{index}.ts"))?;
    playlist_response(context, m3u8)
}

fn playlist_response(context: &Arc<Context>, m3u8: String) -> RouteResult<Response> {
    Ok(Response::builder()
        .header(header::CONTENT_TYPE, context.mime_type())
        .body(Body::from(m3u8))
        .unwrap())
}
