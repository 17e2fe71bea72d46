//! HTTP handlers for the ESP32 fan controller.
//!
//! Registers the Control API endpoints and the static file handler on an
//! `EspHttpServer`. Request bodies are read into a buffer bounded by the
//! scratch size and handed to [`ControlApi`]; the URI matcher runs in
//! wildcard mode so `/*` catches every path the API does not.
//!
//! The ESP-IDF server serves every socket from a single task, so a handler
//! runs to completion before any other request is looked at. `/api/wifi/scan`
//! blocks for the length of a radio scan (a few seconds) and every other
//! endpoint waits behind it; clients are expected to tolerate that stall.

use std::fs;
use std::path::{Path, PathBuf};

use embedded_svc::http::Method;
use embedded_svc::io::{Read, Write};
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use log::{error, info, warn};
use serde::Serialize;

use fanctl_core::{assets, ApiError, ControlApi};
use fanctl_protocol::{encode_response, CodecError};

type HttpRequest<'a, 'b> = Request<&'a mut EspHttpConnection<'b>>;

/// Read the request body, or `None` when it does not fit the scratch buffer.
fn read_body(req: &mut HttpRequest<'_, '_>, limit: usize) -> anyhow::Result<Option<Vec<u8>>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len >= limit {
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = req.read(&mut body[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    body.truncate(filled);
    Ok(Some(body))
}

fn write_json<T: Serialize>(req: HttpRequest<'_, '_>, status: u16, payload: &T) -> anyhow::Result<()> {
    let body = encode_response(payload)?;
    req.into_response(status, None, &[("Content-Type", "application/json")])?
        .write_all(body.as_bytes())?;
    Ok(())
}

fn write_result<T: Serialize>(
    req: HttpRequest<'_, '_>,
    result: Result<T, ApiError>,
) -> anyhow::Result<()> {
    match result {
        Ok(payload) => write_json(req, 200, &payload),
        Err(e) => {
            warn!("Request failed: {}", e);
            write_json(req, e.status_code(), &e.to_response())
        }
    }
}

/// Handle a mutating endpoint: bounded body read, then `op`.
fn handle_body<T: Serialize>(
    mut req: HttpRequest<'_, '_>,
    api: &ControlApi,
    op: impl FnOnce(&ControlApi, &[u8]) -> Result<T, ApiError>,
) -> anyhow::Result<()> {
    let limit = api.scratch_bufsize();
    match read_body(&mut req, limit)? {
        Some(body) => write_result(req, op(api, &body)),
        None => {
            let len = req.content_len().unwrap_or(0) as usize;
            let err = ApiError::from(CodecError::BodyTooLarge { len, limit });
            error!("Request body of {} bytes rejected", len);
            write_json(req, err.status_code(), &err.to_response())
        }
    }
}

fn serve_file(req: HttpRequest<'_, '_>, web_root: &Path) -> anyhow::Result<()> {
    let path = match assets::resolve(web_root, req.uri()) {
        Ok(path) => path,
        Err(e) => {
            warn!("{}", e);
            req.into_status_response(400)?.write_all(b"invalid path")?;
            return Ok(());
        }
    };

    let (path, bytes) = match fs::read(&path) {
        Ok(bytes) => (path, bytes),
        Err(_) => {
            let index = assets::index(web_root);
            match fs::read(&index) {
                Ok(bytes) => (index, bytes),
                Err(e) => {
                    error!("Failed to read file {}: {}", index.display(), e);
                    req.into_status_response(500)?
                        .write_all(b"Failed to read existing file")?;
                    return Ok(());
                }
            }
        }
    };

    let kind = assets::asset_type(&path);
    let mut headers = vec![("Content-Type", kind.content_type)];
    if kind.gzip {
        headers.push(("Content-Encoding", "gzip"));
    }
    req.into_response(200, None, &headers)?.write_all(&bytes)?;
    Ok(())
}

/// Start the HTTP server with all handlers registered.
///
/// The server stops when the returned value is dropped.
pub fn start_http_server(
    api: ControlApi,
    web_root: impl Into<PathBuf>,
    port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = Configuration {
        http_port: port,
        stack_size: 10 * 1024,
        max_uri_handlers: 16,
        uri_match_wildcard: true,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/rpm/get", Method::Get, move |req| {
            write_json(req, 200, &api.get_rpm())
        })?;
    }
    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/fan/speed", Method::Get, move |req| {
            write_json(req, 200, &api.get_fan_speed())
        })?;
    }
    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/fan/speed", Method::Put, move |req| {
            handle_body(req, &api, ControlApi::put_fan_speed)
        })?;
    }
    {
        let api = api.clone();
        // Blocks the server task until the scan finishes.
        server.fn_handler::<anyhow::Error, _>("/api/wifi/scan", Method::Get, move |req| {
            write_json(req, 200, &api.scan())
        })?;
    }
    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/wifi/sta", Method::Post, move |req| {
            handle_body(req, &api, ControlApi::post_station)
        })?;
    }
    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/wifi/status", Method::Get, move |req| {
            write_json(req, 200, &api.get_wifi_status())
        })?;
    }
    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/name", Method::Get, move |req| {
            write_json(req, 200, &api.get_name())
        })?;
    }
    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/name", Method::Put, move |req| {
            handle_body(req, &api, ControlApi::put_name)
        })?;
    }
    {
        let api = api.clone();
        server.fn_handler::<anyhow::Error, _>("/api/mode/get", Method::Get, move |req| {
            write_json(req, 200, &api.get_mode())
        })?;
    }

    let web_root = web_root.into();
    server.fn_handler::<anyhow::Error, _>("/*", Method::Get, move |req| {
        serve_file(req, &web_root)
    })?;

    info!("HTTP server listening on port {}", port);
    Ok(server)
}
