// Single-page client: starts the camera, shows the MJPEG feed, and renders the
// analysis report returned by `/capture_and_analyze`.

pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Pehechan AI</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; background: #111; color: #eee; }
  main { display: flex; gap: 24px; padding: 24px; flex-wrap: wrap; }
  #feed { width: 640px; height: 480px; background: #000; border: 1px solid #444; }
  .panel { min-width: 320px; }
  .card { background: #1c1c1c; border-radius: 6px; padding: 12px; margin-bottom: 10px; }
  .card h3 { margin: 0 0 6px 0; font-size: 14px; color: #9ab; text-transform: uppercase; }
  .bar { height: 6px; background: #333; border-radius: 3px; margin-top: 6px; }
  .bar > div { height: 100%; background: #4c9; border-radius: 3px; }
  #status { font-family: monospace; font-size: 12px; color: #888; }
  button { padding: 8px 16px; }
</style>
</head>
<body>
<main>
  <section>
    <h2>Pehechan AI</h2>
    <img id="feed" alt="camera feed">
    <div style="margin-top: 12px; display: flex; gap: 12px; align-items: center;">
      <label><input type="checkbox" class="feature" value="age" checked> Age</label>
      <label><input type="checkbox" class="feature" value="gender" checked> Gender</label>
      <label><input type="checkbox" class="feature" value="emotion" checked> Emotion</label>
      <label><input type="checkbox" class="feature" value="race" checked> Race</label>
      <button id="capture">Capture &amp; Analyze</button>
      <span id="status">starting</span>
    </div>
  </section>
  <section class="panel">
    <h2>Results</h2>
    <div id="summary"></div>
    <div id="results"><p>No analysis yet.</p></div>
  </section>
</main>
<script>
(function(){
  const status = (t) => { document.getElementById('status').textContent = t; };
  const post = (url, body) => fetch(url, {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify(body || {})
  }).then(r => r.json());

  function card(title, result, extra) {
    const pct = Math.max(0, Math.min(100, result.confidence || 0));
    return '<div class="card"><h3>' + title + '</h3>' +
      '<div>' + result.display + '</div>' + (extra || '') +
      '<div class="bar"><div style="width:' + pct + '%"></div></div>' +
      '<small>' + pct.toFixed(1) + '% confidence</small></div>';
  }

  function render(payload) {
    const r = payload.results, m = payload.metadata;
    let html = '';
    if (r.age) html += card('Age ' + r.age.category_emoji, r.age, '<small>' + r.age.range + ' &middot; ' + r.age.detailed_info.life_stage + '</small>');
    if (r.gender) html += card('Gender', r.gender);
    if (r.emotion) html += card('Emotion', r.emotion);
    if (r.race) html += card('Race', r.race);
    document.getElementById('results').innerHTML = html;
    document.getElementById('summary').textContent =
      'Processed in ' + m.processing_time + 's, detection confidence ' + m.detection_confidence + '%';
  }

  async function start() {
    const reply = await post('/initialize_camera');
    if (!reply.success) { status(reply.error); return; }
    document.getElementById('feed').src = '/camera_feed?t=' + Date.now();
    status('camera ready');
  }

  document.getElementById('capture').onclick = async () => {
    const features = Array.from(document.querySelectorAll('.feature:checked')).map(e => e.value);
    status('analyzing...');
    const reply = await post('/capture_and_analyze', {features});
    if (reply.success) { render(reply); status('done'); } else { status(reply.error); }
  };

  window.addEventListener('beforeunload', () => navigator.sendBeacon('/cleanup_camera'));
  start().catch(e => status('error: ' + e));
})();
</script>
</body>
</html>
"#;
