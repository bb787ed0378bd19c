//! obs-websocket request/response client.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ObsError;
use crate::protocol::{
    Envelope, Hello, Identify, OP_HELLO, OP_IDENTIFIED, OP_IDENTIFY, OP_REQUEST,
    OP_REQUEST_RESPONSE, RPC_VERSION, Request, RequestResponse, auth_response, envelope,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ObsClient {
    ws: WsStream,
    next_id: u64,
    /// `(scene, source)` to scene item id, resolved on first use.
    item_ids: HashMap<(String, String), i64>,
}

impl ObsClient {
    /// Connect to OBS on localhost and complete the identify handshake.
    pub async fn connect(port: u16, password: Option<&str>) -> Result<Self, ObsError> {
        let url = format!("ws://127.0.0.1:{port}");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let mut client = Self {
            ws,
            next_id: 1,
            item_ids: HashMap::new(),
        };
        client.identify(password).await?;
        tracing::info!(port, "connected to obs");
        Ok(client)
    }

    async fn identify(&mut self, password: Option<&str>) -> Result<(), ObsError> {
        let hello = self.recv().await?;
        if hello.op != OP_HELLO {
            return Err(ObsError::Handshake(format!("expected hello, got op {}", hello.op)));
        }
        let hello: Hello = serde_json::from_value(hello.d)?;
        if hello.rpc_version < RPC_VERSION {
            return Err(ObsError::Handshake(format!(
                "unsupported rpc version {}",
                hello.rpc_version
            )));
        }
        let authentication = match (&hello.authentication, password) {
            (Some(challenge), Some(pw)) => Some(auth_response(pw, challenge)),
            (Some(_), None) => return Err(ObsError::PasswordRequired),
            (None, _) => None,
        };
        let identify = Identify {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: 0,
        };
        self.send(&envelope(OP_IDENTIFY, &identify)?).await?;

        let reply = self.recv().await?;
        if reply.op != OP_IDENTIFIED {
            return Err(ObsError::Handshake(format!(
                "expected identified, got op {}",
                reply.op
            )));
        }
        Ok(())
    }

    /// Issue one request and wait for its response.
    pub async fn request(&mut self, request_type: &str, data: Value) -> Result<Value, ObsError> {
        let request_id = self.alloc_id().to_string();
        let req = Request {
            request_type: request_type.to_string(),
            request_id: request_id.clone(),
            request_data: data,
        };
        self.send(&envelope(OP_REQUEST, &req)?).await?;

        loop {
            let msg = self.recv().await?;
            if msg.op != OP_REQUEST_RESPONSE {
                continue;
            }
            let resp: RequestResponse = serde_json::from_value(msg.d)?;
            if resp.request_id != request_id {
                tracing::debug!(request_id = %resp.request_id, "dropping stale obs response");
                continue;
            }
            if !resp.request_status.result {
                return Err(ObsError::Request {
                    request: resp.request_type,
                    code: resp.request_status.code,
                    comment: resp.request_status.comment.unwrap_or_default(),
                });
            }
            return Ok(resp.response_data.unwrap_or(Value::Null));
        }
    }

    pub async fn set_scene(&mut self, scene: &str) -> Result<(), ObsError> {
        self.request("SetCurrentProgramScene", json!({ "sceneName": scene }))
            .await?;
        Ok(())
    }

    pub async fn scene_item_id(&mut self, scene: &str, source: &str) -> Result<i64, ObsError> {
        let key = (scene.to_string(), source.to_string());
        if let Some(id) = self.item_ids.get(&key) {
            return Ok(*id);
        }
        let data = self
            .request(
                "GetSceneItemId",
                json!({ "sceneName": scene, "sourceName": source }),
            )
            .await?;
        let id = data
            .get("sceneItemId")
            .and_then(Value::as_i64)
            .ok_or_else(|| ObsError::MissingData("GetSceneItemId".to_string()))?;
        self.item_ids.insert(key, id);
        Ok(id)
    }

    pub async fn set_scene_item_visible(
        &mut self,
        scene: &str,
        source: &str,
        visible: bool,
    ) -> Result<(), ObsError> {
        let id = self.scene_item_id(scene, source).await?;
        self.request(
            "SetSceneItemEnabled",
            json!({ "sceneName": scene, "sceneItemId": id, "sceneItemEnabled": visible }),
        )
        .await?;
        Ok(())
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn send(&mut self, msg: &Envelope) -> Result<(), ObsError> {
        let text = serde_json::to_string(msg)?;
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Envelope, ObsError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Close(_))) | None => return Err(ObsError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::AuthChallenge;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Minimal OBS stand-in: handshake, then answer every request, sending
    /// an unrelated event before each response. Forwards request payloads.
    pub(crate) async fn fake_obs(password: Option<&'static str>) -> (u16, mpsc::UnboundedReceiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("test");
        let port = listener.local_addr().expect("test").port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("test");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("test");
            let challenge = AuthChallenge {
                challenge: "c2FsdHk=".to_string(),
                salt: "cGVwcGVy".to_string(),
            };
            let hello = match password {
                Some(_) => json!({"op": 0, "d": {"rpcVersion": 1,
                    "authentication": {"challenge": challenge.challenge.clone(), "salt": challenge.salt.clone()}}}),
                None => json!({"op": 0, "d": {"rpcVersion": 1}}),
            };
            ws.send(Message::Text(hello.to_string())).await.expect("test");

            let Some(Ok(Message::Text(text))) = ws.next().await else {
                return;
            };
            let identify: Value = serde_json::from_str(&text).expect("test");
            if let Some(pw) = password {
                if identify["d"]["authentication"] != json!(auth_response(pw, &challenge)) {
                    let _ = ws.close(None).await;
                    return;
                }
            }
            let identified = json!({"op": 2, "d": {"negotiatedRpcVersion": 1}});
            ws.send(Message::Text(identified.to_string())).await.expect("test");

            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let req: Value = serde_json::from_str(&text).expect("test");
                let d = req["d"].clone();
                let _ = tx.send(d.clone());
                let (ok, data) = match d["requestType"].as_str() {
                    Some("GetSceneItemId") => (true, json!({"sceneItemId": 5})),
                    Some("SetCurrentProgramScene") if d["requestData"]["sceneName"] == "Missing" => {
                        (false, Value::Null)
                    }
                    _ => (true, Value::Null),
                };
                let code = if ok { 100 } else { 600 };
                let event = json!({"op": 5, "d": {"eventType": "CurrentProgramSceneChanged"}});
                ws.send(Message::Text(event.to_string())).await.expect("test");
                let resp = json!({"op": 7, "d": {
                    "requestType": d["requestType"],
                    "requestId": d["requestId"],
                    "requestStatus": {"result": ok, "code": code, "comment": "no such scene"},
                    "responseData": data,
                }});
                ws.send(Message::Text(resp.to_string())).await.expect("test");
            }
        });
        (port, rx)
    }

    #[tokio::test]
    async fn handshake_and_scene_switch() {
        let (port, mut seen) = fake_obs(None).await;
        let mut client = ObsClient::connect(port, None).await.expect("connect");
        client.set_scene("Wall").await.expect("set scene");

        let req = seen.recv().await.expect("request");
        assert_eq!(req["requestType"], "SetCurrentProgramScene");
        assert_eq!(req["requestData"]["sceneName"], "Wall");
    }

    #[tokio::test]
    async fn authenticates_with_password() {
        let (port, _seen) = fake_obs(Some("hunter2")).await;
        ObsClient::connect(port, Some("hunter2"))
            .await
            .expect("correct password");
    }

    #[tokio::test]
    async fn wrong_password_fails() {
        let (port, _seen) = fake_obs(Some("hunter2")).await;
        assert!(ObsClient::connect(port, Some("letmein")).await.is_err());
    }

    #[tokio::test]
    async fn missing_password_is_reported() {
        let (port, _seen) = fake_obs(Some("hunter2")).await;
        let err = ObsClient::connect(port, None).await.err().expect("needs password");
        assert!(matches!(err, ObsError::PasswordRequired));
    }

    #[tokio::test]
    async fn failed_request_surfaces_status() {
        let (port, _seen) = fake_obs(None).await;
        let mut client = ObsClient::connect(port, None).await.expect("connect");
        match client.set_scene("Missing").await {
            Err(ObsError::Request { code, .. }) => assert_eq!(code, 600),
            other => panic!("expected request error, got {other:?}"),
        }
        client.set_scene("Wall").await.expect("connection still usable");
    }

    #[tokio::test]
    async fn scene_item_ids_are_cached() {
        let (port, mut seen) = fake_obs(None).await;
        let mut client = ObsClient::connect(port, None).await.expect("connect");
        client.set_scene_item_visible("Wall", "Lock 1", true).await.expect("test");
        client.set_scene_item_visible("Wall", "Lock 1", false).await.expect("test");

        let mut types = Vec::new();
        while let Ok(req) = seen.try_recv() {
            types.push(req["requestType"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(
            types,
            vec!["GetSceneItemId", "SetSceneItemEnabled", "SetSceneItemEnabled"]
        );
    }
}
