//! The single-page UI served at `/`.

pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Solar Panel Detector</title>
<style>
  body { font-family: sans-serif; max-width: 1100px; margin: 2em auto; padding: 0 1em; }
  section { margin-bottom: 2.5em; }
  label { display: block; margin: .6em 0 .2em; }
  input[type=text], input[type=password] { width: 100%; padding: .4em; }
  .row { display: flex; gap: 1em; align-items: flex-start; }
  .row > * { flex: 1; }
  img.result { max-width: 100%; border: 1px solid #ccc; }
  .feedback { font-size: 20px; min-height: 2em; white-space: pre-wrap; }
  .error { color: #b00020; }
  #samples button { margin: .2em; }
</style>
</head>
<body>
<h1>Solar Panel Detector</h1>
<h2>Detect solar panels in satellite images.</h2>

<section>
  <h3>Using an address with Google Maps</h3>
  <ol>
    <li>Enter your address.</li>
    <li>Insert your Google Maps API key, which you can get from
      <a href="https://developers.google.com/maps/documentation/maps-static/get-api-key">the Maps Static API docs</a>.
      Leave it empty to use the key configured on the server.</li>
    <li>Choose the zoom level (19 is the default).</li>
  </ol>
  <form id="address-form">
    <label for="address">Address</label>
    <input type="text" id="address" name="address" required>
    <label for="api_key">Google Maps API key</label>
    <input type="password" id="api_key" name="api_key" autocomplete="off">
    <label for="zoom">Zoom: <span id="zoom-value">19</span></label>
    <input type="range" id="zoom" name="zoom" min="18" max="22" step="1" value="19">
    <p><button type="submit">Submit</button></p>
  </form>
  <div class="row">
    <img id="address-image" class="result" alt="">
    <div id="address-message" class="feedback"></div>
  </div>
</section>

<section>
  <h3>Using a given image</h3>
  <form id="image-form">
    <input type="file" id="image-file" accept="image/*" required>
    <button type="submit">Submit</button>
  </form>
  <div class="row">
    <img id="image-preview" class="result" alt="">
    <img id="image-result" class="result" alt="">
  </div>
  <div id="image-message" class="feedback"></div>
</section>

<section>
  <h3>Image examples</h3>
  <div id="samples">No examples configured.</div>
</section>

<script>
const zoom = document.getElementById('zoom');
zoom.addEventListener('input', () => {
  document.getElementById('zoom-value').textContent = zoom.value;
});

function show(imageId, messageId, response, body) {
  const message = document.getElementById(messageId);
  if (!response.ok) {
    message.classList.add('error');
    message.textContent = body.detail || body.error || ('request failed: ' + response.status);
    return;
  }
  message.classList.remove('error');
  message.textContent = body.message;
  document.getElementById(imageId).src = 'data:image/jpeg;base64,' + body.image;
}

async function post(url, init) {
  const response = await fetch(url, Object.assign({ method: 'POST' }, init));
  let body = {};
  try { body = await response.json(); } catch (_) {}
  return [response, body];
}

document.getElementById('address-form').addEventListener('submit', async (event) => {
  event.preventDefault();
  const form = new URLSearchParams(new FormData(event.target));
  const [response, body] = await post('/detect/address', {
    headers: { 'Content-Type': 'application/x-www-form-urlencoded' },
    body: form.toString(),
  });
  show('address-image', 'address-message', response, body);
});

document.getElementById('image-form').addEventListener('submit', async (event) => {
  event.preventDefault();
  const file = document.getElementById('image-file').files[0];
  if (!file) { return; }
  document.getElementById('image-preview').src = URL.createObjectURL(file);
  const [response, body] = await post('/detect/image', {
    headers: { 'Content-Type': file.type || 'application/octet-stream' },
    body: file,
  });
  show('image-result', 'image-message', response, body);
});

async function loadSamples() {
  const response = await fetch('/samples');
  if (!response.ok) { return; }
  const names = await response.json();
  if (names.length === 0) { return; }
  const container = document.getElementById('samples');
  container.textContent = '';
  for (const name of names) {
    const button = document.createElement('button');
    button.textContent = name;
    button.addEventListener('click', async () => {
      const [res, body] = await post('/detect/sample?name=' + encodeURIComponent(name));
      show('image-result', 'image-message', res, body);
    });
    container.appendChild(button);
  }
}
loadSamples();
</script>
</body>
</html>
"#;
