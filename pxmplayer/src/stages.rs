//! Étages bloquants du pipeline
//!
//! Décodage, quantification et audio tournent chacun sur leur propre thread
//! et alimentent des canaux bornés. Un étage s'arrête dès que le jeton
//! d'arrêt est annulé ou que son aval a fermé le canal: l'arrêt de la
//! diffusion remonte ainsi toute la chaîne.

use pxmdecode::{AudioSegment, AudioTrack, DecodeError, DecodeSession, DecodedFrame};
use pxmdither::{QuantizedFrame, Quantizer};
use std::io;
use std::thread;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) type FrameResult = Result<QuantizedFrame, DecodeError>;

type DecodedResult = Result<DecodedFrame, DecodeError>;

pub(crate) fn spawn_decode(
    mut session: DecodeSession,
    tx: mpsc::Sender<DecodedResult>,
    token: CancellationToken,
) -> io::Result<()> {
    thread::Builder::new()
        .name("pxm-decode".into())
        .spawn(move || {
            while !token.is_cancelled() {
                match session.next() {
                    Ok(Some(frame)) => {
                        if tx.blocking_send(Ok(frame)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
            session.close();
            debug!("Decode stage finished");
        })?;
    Ok(())
}

pub(crate) fn spawn_quantize(
    quantizer: Quantizer,
    mut rx: mpsc::Receiver<DecodedResult>,
    tx: mpsc::Sender<FrameResult>,
    token: CancellationToken,
) -> io::Result<()> {
    thread::Builder::new()
        .name("pxm-quantize".into())
        .spawn(move || {
            while let Some(item) = rx.blocking_recv() {
                if token.is_cancelled() {
                    break;
                }
                let item = item.map(|frame| quantizer.quantize(&frame));
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
            debug!("Quantize stage finished");
        })?;
    Ok(())
}

pub(crate) fn spawn_audio(
    mut track: AudioTrack,
    tx: mpsc::Sender<AudioSegment>,
    token: CancellationToken,
) -> io::Result<()> {
    thread::Builder::new()
        .name("pxm-audio".into())
        .spawn(move || {
            while !token.is_cancelled() {
                match track.next_segment() {
                    Ok(Some(segment)) => {
                        if tx.blocking_send(segment).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // Les images continuent sans le son
                        warn!(error = %e, "Audio decoding stopped");
                        break;
                    }
                }
            }
            debug!("Audio stage finished");
        })?;
    Ok(())
}
