//! A list of wellknown MIME types.

/// Default mimetype for encoding metadata and data.
pub const DEFAULT_MIMETYPE: &str = "application/binary";

/// Well-known MIME types.
#[rustfmt::skip]
#[allow(missing_docs)]
#[allow(non_camel_case_types)]
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownMimeType {
    UNPARSEABLE,
    APPLICATION_AVRO,
    APPLICATION_CBOR,
    APPLICATION_GRAPHQL,
    APPLICATION_GZIP,
    APPLICATION_JAVASCRIPT,
    APPLICATION_JSON,
    APPLICATION_OCTET_STREAM,
    APPLICATION_PDF,
    APPLICATION_VND_APACHE_THRIFT_BINARY,
    APPLICATION_VND_GOOGLE_PROTOBUF,
    APPLICATION_XML,
    APPLICATION_ZIP,
    AUDIO_AAC,
    AUDIO_MP3,
    AUDIO_MP4,
    AUDIO_MPEG3,
    AUDIO_MPEG,
    AUDIO_OGG,
    AUDIO_OPUS,
    AUDIO_VORBIS,
    IMAGE_BMP,
    IMAGE_GIF,
    IMAGE_HEIC_SEQUENCE,
    IMAGE_HEIC,
    IMAGE_HEIF_SEQUENCE,
    IMAGE_HEIF,
    IMAGE_JPEG,
    IMAGE_PNG,
    IMAGE_TIFF,
    MULTIPART_MIXED,
    TEXT_CSS,
    TEXT_CSV,
    TEXT_HTML,
    TEXT_PLAIN,
    TEXT_XML,
    VIDEO_H264,
    VIDEO_H265,
    VIDEO_VP8,
    APPLICATION_X_HESSIAN,
    APPLICATION_X_JAVA_OBJECT,
    APPLICATION_CLOUDEVENTS_JSON,
    MESSAGE_X_RSOCKET_MIME_TYPE_V0,
    MESSAGE_X_RSOCKET_ACCEPT_TIME_TYPES_V0,
    MESSAGE_X_RSOCKET_AUTHENTICATION_V0,
    MESSAGE_X_RSOCKET_TRACING_ZIPKIN_V0,
    MESSAGE_X_RSOCKET_ROUTING_V0,
    MESSAGE_X_RSOCKET_COMPOSITE_METADATA_V0,
}

#[rustfmt::skip]
impl From<&str> for WellKnownMimeType {
    fn from(v: &str) -> Self {
        use WellKnownMimeType::*;
        match v {
            "application/avro" => APPLICATION_AVRO,
            "application/cbor" => APPLICATION_CBOR,
            "application/graphql" => APPLICATION_GRAPHQL,
            "application/gzip" => APPLICATION_GZIP,
            "application/javascript" => APPLICATION_JAVASCRIPT,
            "application/json" => APPLICATION_JSON,
            "application/octet-stream" => APPLICATION_OCTET_STREAM,
            "application/pdf" => APPLICATION_PDF,
            "application/vnd.apache.thrift.binary" => APPLICATION_VND_APACHE_THRIFT_BINARY,
            "application/vnd.google.protobuf" => APPLICATION_VND_GOOGLE_PROTOBUF,
            "application/xml" => APPLICATION_XML,
            "application/zip" => APPLICATION_ZIP,
            "audio/aac" => AUDIO_AAC,
            "audio/mp3" => AUDIO_MP3,
            "audio/mp4" => AUDIO_MP4,
            "audio/mpeg3" => AUDIO_MPEG3,
            "audio/mpeg" => AUDIO_MPEG,
            "audio/ogg" => AUDIO_OGG,
            "audio/opus" => AUDIO_OPUS,
            "audio/vorbis" => AUDIO_VORBIS,
            "image/bmp" => IMAGE_BMP,
            "image/gif" => IMAGE_GIF,
            "image/heic-sequence" => IMAGE_HEIC_SEQUENCE,
            "image/heic" => IMAGE_HEIC,
            "image/heif-sequence" => IMAGE_HEIF_SEQUENCE,
            "image/heif" => IMAGE_HEIF,
            "image/jpeg" => IMAGE_JPEG,
            "image/png" => IMAGE_PNG,
            "image/tiff" => IMAGE_TIFF,
            "multipart/mixed" => MULTIPART_MIXED,
            "text/css" => TEXT_CSS,
            "text/csv" => TEXT_CSV,
            "text/html" => TEXT_HTML,
            "text/plain" => TEXT_PLAIN,
            "text/xml" => TEXT_XML,
            "video/H264" => VIDEO_H264,
            "video/H265" => VIDEO_H265,
            "video/VP8" => VIDEO_VP8,
            "application/x-hessian" => APPLICATION_X_HESSIAN,
            "application/x-java-object" => APPLICATION_X_JAVA_OBJECT,
            "application/cloudevents+json" => APPLICATION_CLOUDEVENTS_JSON,
            "message/x.rsocket.mime.type.v0" => MESSAGE_X_RSOCKET_MIME_TYPE_V0,
            "message/x.rsocket.accept.time.types.v0" => MESSAGE_X_RSOCKET_ACCEPT_TIME_TYPES_V0,
            "message/x.rsocket.authentication.v0" => MESSAGE_X_RSOCKET_AUTHENTICATION_V0,
            "message/x.rsocket.tracing.zipkin.v0" => MESSAGE_X_RSOCKET_TRACING_ZIPKIN_V0,
            "message/x.rsocket.routing.v0" => MESSAGE_X_RSOCKET_ROUTING_V0,
            "message/x.rsocket.composite.metadata.v0" => MESSAGE_X_RSOCKET_COMPOSITE_METADATA_V0,
            _ => UNPARSEABLE,
        }
    }
}

#[rustfmt::skip]
impl From<WellKnownMimeType> for &'static str {
    fn from(t: WellKnownMimeType) -> &'static str {
        use WellKnownMimeType::*;
        match t {
            UNPARSEABLE => "",
            APPLICATION_AVRO => "application/avro",
            APPLICATION_CBOR => "application/cbor",
            APPLICATION_GRAPHQL => "application/graphql",
            APPLICATION_GZIP => "application/gzip",
            APPLICATION_JAVASCRIPT => "application/javascript",
            APPLICATION_JSON => "application/json",
            APPLICATION_OCTET_STREAM => "application/octet-stream",
            APPLICATION_PDF => "application/pdf",
            APPLICATION_VND_APACHE_THRIFT_BINARY => "application/vnd.apache.thrift.binary",
            APPLICATION_VND_GOOGLE_PROTOBUF => "application/vnd.google.protobuf",
            APPLICATION_XML => "application/xml",
            APPLICATION_ZIP => "application/zip",
            AUDIO_AAC => "audio/aac",
            AUDIO_MP3 => "audio/mp3",
            AUDIO_MP4 => "audio/mp4",
            AUDIO_MPEG3 => "audio/mpeg3",
            AUDIO_MPEG => "audio/mpeg",
            AUDIO_OGG => "audio/ogg",
            AUDIO_OPUS => "audio/opus",
            AUDIO_VORBIS => "audio/vorbis",
            IMAGE_BMP => "image/bmp",
            IMAGE_GIF => "image/gif",
            IMAGE_HEIC_SEQUENCE => "image/heic-sequence",
            IMAGE_HEIC => "image/heic",
            IMAGE_HEIF_SEQUENCE => "image/heif-sequence",
            IMAGE_HEIF => "image/heif",
            IMAGE_JPEG => "image/jpeg",
            IMAGE_PNG => "image/png",
            IMAGE_TIFF => "image/tiff",
            MULTIPART_MIXED => "multipart/mixed",
            TEXT_CSS => "text/css",
            TEXT_CSV => "text/csv",
            TEXT_HTML => "text/html",
            TEXT_PLAIN => "text/plain",
            TEXT_XML => "text/xml",
            VIDEO_H264 => "video/H264",
            VIDEO_H265 => "video/H265",
            VIDEO_VP8 => "video/VP8",
            APPLICATION_X_HESSIAN => "application/x-hessian",
            APPLICATION_X_JAVA_OBJECT => "application/x-java-object",
            APPLICATION_CLOUDEVENTS_JSON => "application/cloudevents+json",
            MESSAGE_X_RSOCKET_MIME_TYPE_V0 => "message/x.rsocket.mime.type.v0",
            MESSAGE_X_RSOCKET_ACCEPT_TIME_TYPES_V0 => "message/x.rsocket.accept.time.types.v0",
            MESSAGE_X_RSOCKET_AUTHENTICATION_V0 => "message/x.rsocket.authentication.v0",
            MESSAGE_X_RSOCKET_TRACING_ZIPKIN_V0 => "message/x.rsocket.tracing.zipkin.v0",
            MESSAGE_X_RSOCKET_ROUTING_V0 => "message/x.rsocket.routing.v0",
            MESSAGE_X_RSOCKET_COMPOSITE_METADATA_V0 => "message/x.rsocket.composite.metadata.v0",
        }
    }
}

impl WellKnownMimeType {
    /// Returns the canonical MIME string for this well-known type, or `None` for
    /// [`WellKnownMimeType::UNPARSEABLE`].
    pub fn as_str(self) -> Option<&'static str> {
        if self == WellKnownMimeType::UNPARSEABLE {
            None
        } else {
            Some(self.into())
        }
    }

    /// Resolves `mime` against the well-known table, falling back to the literal string when
    /// it isn't one of the recognized entries.
    pub fn resolve(mime: &str) -> Self {
        WellKnownMimeType::from(mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_mime_type() {
        let mime: WellKnownMimeType = "unparsable".into();
        let string: &'static str = mime.into();
        assert_eq!(mime, WellKnownMimeType::UNPARSEABLE);
        assert_eq!(string, "");
    }
}
